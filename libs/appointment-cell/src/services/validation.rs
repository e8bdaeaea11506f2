// libs/appointment-cell/src/services/validation.rs
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use availability_cell::models::TimeSlot;
use shared_models::error::FieldError;

use crate::models::{AppointmentType, CreateAppointmentRequest, ValidatedAppointment};

pub const NOTE_MAX_CHARS: usize = 500;

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10}$").expect("phone pattern compiles"));

/// Checks every field and reports all problems at once.
pub fn validate_request(request: &CreateAppointmentRequest) -> Result<ValidatedAppointment, Vec<FieldError>> {
    let mut errors = Vec::new();

    let slot = match request.scheduled_at {
        None => {
            errors.push(FieldError::new("scheduled_at", "Select a date and time"));
            None
        }
        Some(at) => match TimeSlot::from_datetime(&at) {
            Some(slot) => Some(slot),
            None => {
                errors.push(FieldError::new("scheduled_at", "Time must fall on a whole minute"));
                None
            }
        },
    };

    let appointment_type = match request.appointment_type.trim() {
        "" => {
            errors.push(FieldError::new("appointment_type", "Appointment type is required"));
            None
        }
        raw => match raw.parse::<AppointmentType>() {
            Ok(t) => Some(t),
            Err(e) => {
                errors.push(FieldError::new("appointment_type", e));
                None
            }
        },
    };

    let phone = request.phone.as_deref().map(str::trim).unwrap_or_default();
    if let Some(message) = phone_error(phone) {
        errors.push(FieldError::new("phone", message));
    }

    let note = request
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    if let Some(n) = &note {
        if n.chars().count() > NOTE_MAX_CHARS {
            errors.push(FieldError::new(
                "note",
                format!("Note must be at most {} characters", NOTE_MAX_CHARS),
            ));
        }
    }

    match (request.scheduled_at, slot, appointment_type) {
        (Some(scheduled_at), Some(slot), Some(appointment_type)) if errors.is_empty() => {
            Ok(ValidatedAppointment {
                scheduled_at,
                slot,
                appointment_type,
                phone: phone.to_string(),
                note,
            })
        }
        _ => {
            debug!("Appointment request has {} invalid field(s)", errors.len());
            Err(errors)
        }
    }
}

fn phone_error(phone: &str) -> Option<&'static str> {
    if phone.is_empty() {
        Some("Phone number is required")
    } else if !PHONE_PATTERN.is_match(phone) {
        Some("Phone number must be exactly 10 digits")
    } else {
        None
    }
}
