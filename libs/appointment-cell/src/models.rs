// libs/appointment-cell/src/models.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use availability_cell::models::{AvailabilityError, TimeSlot};
use shared_models::error::{AppError, FieldError};

pub use shared_models::appointment::{Appointment, AppointmentStatus, AppointmentType};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Booking form as submitted by a patient. Field checks are collected by
/// `validation::validate_request` rather than rejected at deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    #[serde(default, alias = "date")]
    pub scheduled_at: Option<NaiveDateTime>,
    #[serde(default, alias = "type")]
    pub appointment_type: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// A request that passed field validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAppointment {
    pub scheduled_at: NaiveDateTime,
    pub slot: TimeSlot,
    pub appointment_type: AppointmentType,
    pub phone: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusDecision {
    Accept,
    Decline,
}

impl StatusDecision {
    pub fn target_status(&self) -> AppointmentStatus {
        match self {
            StatusDecision::Accept => AppointmentStatus::Accepted,
            StatusDecision::Decline => AppointmentStatus::Declined,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            StatusDecision::Accept => "Appointment accepted",
            StatusDecision::Decline => "Appointment declined",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub message: Option<String>,
}

// ==============================================================================
// STORE ROWS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct NewAppointmentRow {
    pub patient_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub slot_key: String,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub note: Option<String>,
    pub phone: String,
}

/// Row of `appointment_responses`: the doctor's answer to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentResponseRow {
    pub appointment_id: Uuid,
    pub responded_by: Uuid,
    pub response: AppointmentStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewAppointment,
    AppointmentAccepted,
    AppointmentDeclined,
    AppointmentRerequested,
}

/// Row of `notifications`, addressed to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRow {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub read: bool,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment slot not available")]
    SlotNotAvailable,

    #[error("Invalid fields")]
    InvalidFields(Vec<FieldError>),

    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment in status {0} can no longer be withdrawn")]
    CannotWithdraw(AppointmentStatus),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for AppointmentError {
    fn from(err: anyhow::Error) -> Self {
        AppointmentError::DatabaseError(err.to_string())
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound(err.to_string()),
            AppointmentError::SlotNotAvailable => AppError::Conflict(err.to_string()),
            AppointmentError::InvalidFields(fields) => AppError::InvalidFields(fields),
            AppointmentError::Availability(inner) => inner.into(),
            AppointmentError::InvalidStatusTransition { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::CannotWithdraw(_) => AppError::Conflict(err.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn request_accepts_form_field_names() {
        let request: CreateAppointmentRequest = serde_json::from_value(json!({
            "date": "2024-06-15T10:30:00",
            "type": "follow-up",
            "phone": "0612345678"
        })).unwrap();

        assert!(request.scheduled_at.is_some());
        assert_eq!(request.appointment_type, "follow-up");
        assert!(request.note.is_none());
    }

    #[test]
    fn notification_kind_is_serialized_as_type() {
        let row = NotificationRow {
            user_id: Uuid::nil(),
            kind: NotificationKind::AppointmentAccepted,
            message: "ok".into(),
            read: false,
        };
        let value = serde_json::to_value(row).unwrap();
        assert_eq!(value["type"], "appointment_accepted");
        assert_eq!(value["user_id"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn errors_map_to_http_errors() {
        assert_matches!(AppError::from(AppointmentError::SlotNotAvailable), AppError::Conflict(_));
        assert_matches!(AppError::from(AppointmentError::Unauthorized), AppError::Forbidden(_));
        assert_matches!(
            AppError::from(AppointmentError::InvalidFields(vec![FieldError::new("phone", "required")])),
            AppError::InvalidFields(fields) if fields.len() == 1
        );
        assert_matches!(
            AppError::from(AppointmentError::Availability(AvailabilityError::InvalidSlot("09:15".into()))),
            AppError::BadRequest(_)
        );
    }
}
