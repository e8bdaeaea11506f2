// libs/appointment-cell/src/services/notification.rs
use std::sync::Arc;

use anyhow::Result;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentResponseRow, NotificationKind, NotificationRow, StatusDecision,
};

/// Writes doctor responses and notification rows.
pub struct NotificationService {
    supabase: Arc<SupabaseClient>,
}

impl NotificationService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn record_response(
        &self,
        appointment: &Appointment,
        decision: StatusDecision,
        responded_by: Uuid,
        message: Option<String>,
        auth_token: &str,
    ) -> Result<()> {
        let row = AppointmentResponseRow {
            appointment_id: appointment.id,
            responded_by,
            response: decision.target_status(),
            message: message.unwrap_or_else(|| decision.message().to_string()),
        };

        self.insert("/rest/v1/appointment_responses", serde_json::to_value(row)?, auth_token).await
    }

    /// Tell the patient the doctor answered.
    pub async fn notify_patient(
        &self,
        appointment: &Appointment,
        decision: StatusDecision,
        auth_token: &str,
    ) -> Result<()> {
        let (kind, message) = match decision {
            StatusDecision::Accept => (
                NotificationKind::AppointmentAccepted,
                format!("Your appointment request for {} was accepted", appointment.scheduled_at.format("%Y-%m-%d %H:%M")),
            ),
            StatusDecision::Decline => (
                NotificationKind::AppointmentDeclined,
                format!("Your appointment request for {} was declined", appointment.scheduled_at.format("%Y-%m-%d %H:%M")),
            ),
        };

        self.send(NotificationRow {
            user_id: appointment.patient_id,
            kind,
            message,
            read: false,
        }, auth_token).await
    }

    /// Confirmation in the requesting patient's feed.
    pub async fn notify_request(&self, appointment: &Appointment, kind: NotificationKind, auth_token: &str) -> Result<()> {
        let prefix = match kind {
            NotificationKind::AppointmentRerequested => "Appointment re-requested for",
            _ => "New appointment request for",
        };

        self.send(NotificationRow {
            user_id: appointment.patient_id,
            kind,
            message: format!("{} {}", prefix, appointment.scheduled_at.format("%Y-%m-%d %H:%M")),
            read: false,
        }, auth_token).await
    }

    async fn send(&self, row: NotificationRow, auth_token: &str) -> Result<()> {
        debug!("Sending {:?} notification", row.kind);
        self.insert("/rest/v1/notifications", serde_json::to_value(row)?, auth_token).await
    }

    async fn insert(&self, path: &str, row: Value, auth_token: &str) -> Result<()> {
        let result: Result<Vec<Value>> = self.supabase.request(
            Method::POST,
            path,
            Some(auth_token),
            Some(row),
        ).await;

        if let Err(e) = &result {
            error!("Failed to write {}: {}", path, e);
        }
        result.map(|_| ())
    }
}
