use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booking request as stored in the `appointments` table.
///
/// `scheduled_at` is clinic-local wall-clock time (`timestamp without time zone`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    #[serde(alias = "date")]
    pub scheduled_at: NaiveDateTime,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn date(&self) -> NaiveDate {
        self.scheduled_at.date()
    }

    pub fn hour(&self) -> u32 {
        self.scheduled_at.hour()
    }

    pub fn minutes(&self) -> u32 {
        self.scheduled_at.minute()
    }

    /// Declined requests never hold on to their slot.
    pub fn occupies_slot(&self) -> bool {
        self.status.occupies_slot()
    }

    pub fn belongs_to(&self, user_id: &str) -> bool {
        self.patient_id.to_string() == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Accepted,
    Declined,
}

impl AppointmentStatus {
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Declined)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Accepted => "accepted",
            AppointmentStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "accepted" => Ok(AppointmentStatus::Accepted),
            "declined" => Ok(AppointmentStatus::Declined),
            other => Err(format!("Unknown appointment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentType {
    Consultation,
    #[serde(alias = "follow_up", alias = "followup")]
    FollowUp,
    Emergency,
    Other,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Consultation => "consultation",
            AppointmentType::FollowUp => "follow-up",
            AppointmentType::Emergency => "emergency",
            AppointmentType::Other => "other",
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consultation" => Ok(AppointmentType::Consultation),
            "follow-up" | "follow_up" | "followup" => Ok(AppointmentType::FollowUp),
            "emergency" => Ok(AppointmentType::Emergency),
            "other" => Ok(AppointmentType::Other),
            other => Err(format!("Unknown appointment type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_store_row() {
        let row = json!({
            "id": "6f1c2a5e-8a55-4d0b-9a55-0f1f2b3c4d5e",
            "patient_id": "0b7d6c3a-1f2e-4d5c-8b9a-7e6f5d4c3b2a",
            "scheduled_at": "2024-06-15T10:30:00",
            "appointment_type": "follow-up",
            "status": "accepted",
            "note": null,
            "phone": "0612345678"
        });

        let appointment: Appointment = serde_json::from_value(row).unwrap();
        assert_eq!(appointment.date(), NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
        assert_eq!((appointment.hour(), appointment.minutes()), (10, 30));
        assert_eq!(appointment.appointment_type, AppointmentType::FollowUp);
        assert!(appointment.occupies_slot());
        assert!(appointment.created_at.is_none());
    }

    #[test]
    fn accepts_date_alias_for_scheduled_time() {
        let row = json!({
            "id": "6f1c2a5e-8a55-4d0b-9a55-0f1f2b3c4d5e",
            "patient_id": "0b7d6c3a-1f2e-4d5c-8b9a-7e6f5d4c3b2a",
            "date": "2024-06-15T10:00:00",
            "appointment_type": "consultation",
            "status": "declined"
        });

        let appointment: Appointment = serde_json::from_value(row).unwrap();
        assert_eq!(appointment.hour(), 10);
        assert!(!appointment.occupies_slot());
    }

    #[test]
    fn status_strings_match_wire_format() {
        for status in [AppointmentStatus::Pending, AppointmentStatus::Accepted, AppointmentStatus::Declined] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, json!(status.as_str()));
            assert_eq!(status.as_str().parse::<AppointmentStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn follow_up_uses_kebab_case() {
        assert_eq!(serde_json::to_value(AppointmentType::FollowUp).unwrap(), json!("follow-up"));
        assert_eq!("follow_up".parse::<AppointmentType>().unwrap(), AppointmentType::FollowUp);
    }
}
