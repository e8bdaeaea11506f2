// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use availability_cell::engine::{self, BookingWindow, SlotSchedule};
use availability_cell::models::TimeSlot;
use availability_cell::services::{AgendaStore, AppointmentQuery, SupabaseAgendaStore};
use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest, NewAppointmentRow,
    NotificationKind, StatusDecision,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notification::NotificationService;
use crate::services::validation::validate_request;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    agenda: SupabaseAgendaStore,
    lifecycle_service: AppointmentLifecycleService,
    notification_service: NotificationService,
    schedule: SlotSchedule,
    window: BookingWindow,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Result<Self, AppointmentError> {
        let supabase = Arc::new(SupabaseClient::new(config));

        Ok(Self {
            agenda: SupabaseAgendaStore::with_client(Arc::clone(&supabase)),
            notification_service: NotificationService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            schedule: SlotSchedule::from_config(&config.scheduling)?,
            window: BookingWindow::from_config(&config.scheduling),
            supabase,
        })
    }

    /// Book a pending appointment for `patient`. The slot is re-checked
    /// against fresh store data; the store's unique `slot_key` index settles
    /// races between concurrent requests.
    #[instrument(skip(self, patient, request, auth_token), fields(patient_id = %patient.id))]
    pub async fn create_appointment(
        &self,
        patient: &User,
        request: CreateAppointmentRequest,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = user_uuid(patient)?;
        let validated = validate_request(&request).map_err(AppointmentError::InvalidFields)?;

        let date = validated.scheduled_at.date();
        self.window.check(today, date)?;
        self.schedule.require(validated.slot)?;
        self.ensure_slot_free(date, validated.slot, auth_token).await?;

        let row = NewAppointmentRow {
            patient_id,
            scheduled_at: validated.scheduled_at,
            slot_key: validated.slot.slot_key(date),
            appointment_type: validated.appointment_type,
            status: AppointmentStatus::Pending,
            note: validated.note,
            phone: validated.phone,
        };
        let body = serde_json::to_value(&row)
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(store_error)?;

        let appointment = first_row(result)?
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))?;

        self.notification_service
            .notify_request(&appointment, NotificationKind::NewAppointment, auth_token)
            .await?;

        info!("Appointment {} requested for {}", appointment.id, row.slot_key);
        Ok(appointment)
    }

    /// Staff see every appointment, patients only their own.
    pub async fn list_appointments(
        &self,
        user: &User,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let patient_id = if user.is_staff() {
            None
        } else {
            Some(user_uuid(user)?)
        };

        let query = AppointmentQuery { from, to, patient_id };
        Ok(self.agenda.fetch_appointments(query, auth_token).await?)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(store_error)?;

        first_row(result)?.ok_or(AppointmentError::NotFound)
    }

    /// Doctor accepts or declines a pending request.
    #[instrument(skip(self, doctor, message, auth_token), fields(doctor_id = %doctor.id))]
    pub async fn respond(
        &self,
        appointment_id: Uuid,
        decision: StatusDecision,
        doctor: &User,
        message: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let doctor_id = user_uuid(doctor)?;
        let target = decision.target_status();

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service.validate_status_transition(current.status, target)?;

        let updated = self
            .update_status(appointment_id, AppointmentStatus::Pending, target, auth_token)
            .await?;

        self.notification_service
            .record_response(&updated, decision, doctor_id, message, auth_token)
            .await?;
        self.notification_service
            .notify_patient(&updated, decision, auth_token)
            .await?;

        info!("Appointment {} {}", appointment_id, target);
        Ok(updated)
    }

    /// Patient asks again for a declined slot.
    #[instrument(skip(self, patient, auth_token), fields(patient_id = %patient.id))]
    pub async fn rerequest(
        &self,
        appointment_id: Uuid,
        patient: &User,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;
        if !current.belongs_to(&patient.id) {
            warn!("User {} tried to re-request appointment {}", patient.id, appointment_id);
            return Err(AppointmentError::Unauthorized);
        }
        self.lifecycle_service
            .validate_status_transition(current.status, AppointmentStatus::Pending)?;

        let date = current.date();
        let slot = TimeSlot::new(current.hour(), current.minutes())?;
        self.window.check(today, date)?;
        self.schedule.require(slot)?;
        self.ensure_slot_free(date, slot, auth_token).await?;

        let updated = self
            .update_status(appointment_id, AppointmentStatus::Declined, AppointmentStatus::Pending, auth_token)
            .await?;

        self.notification_service
            .notify_request(&updated, NotificationKind::AppointmentRerequested, auth_token)
            .await?;

        info!("Appointment {} re-requested", appointment_id);
        Ok(updated)
    }

    /// Admins delete anything; patients withdraw their own unaccepted requests.
    #[instrument(skip(self, user, auth_token), fields(user_id = %user.id))]
    pub async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;

        let mut path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        if !user.is_admin() {
            if !current.belongs_to(&user.id) {
                return Err(AppointmentError::Unauthorized);
            }
            if !self.lifecycle_service.can_patient_delete(current.status) {
                return Err(AppointmentError::CannotWithdraw(current.status));
            }
            path.push_str("&status=in.(pending,declined)");
        }

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(store_error)?;

        if result.is_empty() {
            // Accepted between our read and the delete
            return Err(AppointmentError::CannotWithdraw(AppointmentStatus::Accepted));
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    async fn ensure_slot_free(
        &self,
        date: NaiveDate,
        slot: TimeSlot,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let appointments = self.agenda.fetch_appointments(AppointmentQuery::on(date), auth_token).await?;
        let blocked = self.agenda.fetch_blocked_times(Some(date), Some(date), auth_token).await?;

        if !engine::is_slot_available(date, slot, &appointments, &blocked) {
            warn!("Slot {} on {} is not available", slot, date);
            return Err(AppointmentError::SlotNotAvailable);
        }
        Ok(())
    }

    /// Compare-and-swap on the status column: only rows still in `from` change.
    async fn update_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.{}", appointment_id, from);
        let body = json!({
            "status": to,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(store_error)?;

        first_row(result)?.ok_or_else(|| {
            warn!("Appointment {} left {} concurrently", appointment_id, from);
            AppointmentError::InvalidStatusTransition { from, to }
        })
    }
}

fn user_uuid(user: &User) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(&user.id).map_err(|_| AppointmentError::Unauthorized)
}

/// A unique-index violation on `slot_key` means someone else holds the slot.
fn store_error(err: anyhow::Error) -> AppointmentError {
    if SupabaseError::is_conflict(&err) {
        AppointmentError::SlotNotAvailable
    } else {
        AppointmentError::DatabaseError(err.to_string())
    }
}

fn first_row(rows: Vec<Value>) -> Result<Option<Appointment>, AppointmentError> {
    rows.into_iter()
        .next()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
}
