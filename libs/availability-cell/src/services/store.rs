use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::appointment::Appointment;

use crate::models::{BlockEntry, BlockedTimeRow, BlockedTimes};

/// Filter for appointment reads. Patients only ever see their own rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppointmentQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub patient_id: Option<Uuid>,
}

impl AppointmentQuery {
    pub fn on(date: NaiveDate) -> Self {
        Self { from: Some(date), to: Some(date), patient_id: None }
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from: Some(from), to: Some(to), patient_id: None }
    }
}

/// Read side of the agenda tables.
#[async_trait]
pub trait AgendaStore: Send + Sync {
    async fn fetch_appointments(&self, query: AppointmentQuery, auth_token: &str) -> Result<Vec<Appointment>>;

    async fn fetch_blocked_times(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<BlockedTimes>;
}

pub struct SupabaseAgendaStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAgendaStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn insert_block(&self, entry: BlockEntry, auth_token: &str) -> Result<()> {
        let row = serde_json::to_value(BlockedTimeRow::from(entry))?;
        debug!("Inserting blocked time {:?}", entry);

        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/blocked_times",
            Some(auth_token),
            Some(row),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        Ok(())
    }

    pub async fn delete_block(&self, entry: BlockEntry, auth_token: &str) -> Result<()> {
        let path = match entry {
            BlockEntry::Day(date) => format!(
                "/rest/v1/blocked_times?block_type=eq.day&date=eq.{}",
                date
            ),
            BlockEntry::Hour(block) => format!(
                "/rest/v1/blocked_times?block_type=eq.hour&date=eq.{}&hour=eq.{}&minutes=eq.{}",
                block.date, block.slot.hour, block.slot.minutes
            ),
        };
        debug!("Deleting blocked time {:?}", entry);

        let _: Vec<Value> = self.supabase.request(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
        ).await?;

        Ok(())
    }
}

#[async_trait]
impl AgendaStore for SupabaseAgendaStore {
    async fn fetch_appointments(&self, query: AppointmentQuery, auth_token: &str) -> Result<Vec<Appointment>> {
        let mut path = "/rest/v1/appointments?select=*&order=scheduled_at.asc".to_string();

        if let Some(from) = query.from {
            path.push_str(&format!("&scheduled_at=gte.{}T00:00:00", from));
        }
        if let Some(to) = query.to {
            path.push_str(&format!("&scheduled_at=lte.{}T23:59:59", to));
        }
        if let Some(patient_id) = query.patient_id {
            path.push_str(&format!("&patient_id=eq.{}", patient_id));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let appointments = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Appointment>, _>>()?;

        debug!("Fetched {} appointments", appointments.len());
        Ok(appointments)
    }

    async fn fetch_blocked_times(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<BlockedTimes> {
        let mut path = "/rest/v1/blocked_times?select=*&order=date.asc".to_string();

        if let Some(from) = from {
            path.push_str(&format!("&date=gte.{}", from));
        }
        if let Some(to) = to {
            path.push_str(&format!("&date=lte.{}", to));
        }

        let rows: Vec<BlockedTimeRow> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        debug!("Fetched {} blocked time rows", rows.len());
        Ok(BlockedTimes::from_rows(rows))
    }
}
