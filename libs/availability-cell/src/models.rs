// libs/availability-cell/src/models.rs
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::appointment::Appointment;
use shared_models::error::AppError;

// ==============================================================================
// SLOTS
// ==============================================================================

/// A bookable unit of the clinic day, identified by its start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub hour: u32,
    pub minutes: u32,
}

impl TimeSlot {
    pub fn new(hour: u32, minutes: u32) -> Result<Self, AvailabilityError> {
        if hour > 23 || minutes > 59 {
            return Err(AvailabilityError::InvalidSlot(format!("{:02}:{:02}", hour, minutes)));
        }
        Ok(Self { hour, minutes })
    }

    /// Slot starting at the given wall-clock time, if it lands on a whole minute.
    pub fn from_datetime(at: &NaiveDateTime) -> Option<Self> {
        if at.second() != 0 || at.nanosecond() != 0 {
            return None;
        }
        Some(Self { hour: at.hour(), minutes: at.minute() })
    }

    pub fn minute_of_day(&self) -> u32 {
        self.hour * 60 + self.minutes
    }

    pub fn time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minutes, 0)
    }

    pub fn on(&self, date: NaiveDate) -> Option<NaiveDateTime> {
        self.time().map(|t| date.and_time(t))
    }

    /// Key used by the store's uniqueness constraint: `yyyy-MM-ddTHH:mm`.
    pub fn slot_key(&self, date: NaiveDate) -> String {
        format!("{}T{}", date.format("%Y-%m-%d"), self)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minutes)
    }
}

// ==============================================================================
// BLOCKED TIMES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HourBlock {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub slot: TimeSlot,
}

/// Day-blocks and hour-blocks are kept as independent sets. A slot is
/// effectively blocked when either set covers it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedTimes {
    #[serde(default)]
    pub days: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub hours: BTreeSet<HourBlock>,
}

impl BlockedTimes {
    pub fn is_day_blocked(&self, date: NaiveDate) -> bool {
        self.days.contains(&date)
    }

    pub fn has_hour_block(&self, date: NaiveDate, slot: TimeSlot) -> bool {
        self.hours.contains(&HourBlock { date, slot })
    }

    pub fn hour_blocks_on(&self, date: NaiveDate) -> impl Iterator<Item = &HourBlock> + '_ {
        self.hours.iter().filter(move |b| b.date == date)
    }

    pub fn set_day(&mut self, date: NaiveDate, blocked: bool) {
        if blocked {
            self.days.insert(date);
        } else {
            self.days.remove(&date);
        }
    }

    pub fn set_hour(&mut self, date: NaiveDate, slot: TimeSlot, blocked: bool) {
        let entry = HourBlock { date, slot };
        if blocked {
            self.hours.insert(entry);
        } else {
            self.hours.remove(&entry);
        }
    }

    pub fn from_rows(rows: impl IntoIterator<Item = BlockedTimeRow>) -> Self {
        let mut blocked = Self::default();
        for row in rows {
            match row.entry() {
                Some(BlockEntry::Day(date)) => {
                    blocked.days.insert(date);
                }
                Some(BlockEntry::Hour(block)) => {
                    blocked.hours.insert(block);
                }
                None => tracing::warn!("Skipping malformed blocked_times row {:?}", row.id),
            }
        }
        blocked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Day,
    Hour,
}

/// Row of the `blocked_times` table, keyed by (date, hour, minutes, block_type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedTimeRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub date: NaiveDate,
    pub hour: Option<u32>,
    pub minutes: Option<u32>,
    pub block_type: BlockType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEntry {
    Day(NaiveDate),
    Hour(HourBlock),
}

impl BlockedTimeRow {
    pub fn entry(&self) -> Option<BlockEntry> {
        match self.block_type {
            BlockType::Day => Some(BlockEntry::Day(self.date)),
            BlockType::Hour => {
                let slot = TimeSlot::new(self.hour?, self.minutes.unwrap_or(0)).ok()?;
                Some(BlockEntry::Hour(HourBlock { date: self.date, slot }))
            }
        }
    }
}

impl From<BlockEntry> for BlockedTimeRow {
    fn from(entry: BlockEntry) -> Self {
        match entry {
            BlockEntry::Day(date) => Self {
                id: None,
                date,
                hour: None,
                minutes: None,
                block_type: BlockType::Day,
            },
            BlockEntry::Hour(block) => Self {
                id: None,
                date: block.date,
                hour: Some(block.slot.hour),
                minutes: Some(block.slot.minutes),
                block_type: BlockType::Hour,
            },
        }
    }
}

// ==============================================================================
// AGENDA VIEWS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Outside the booking window; neither bookable nor administrable.
    Disabled,
    Blocked,
    Booked,
    Available,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: TimeSlot,
    pub label: String,
    pub state: SlotState,
    pub hour_blocked: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAgenda {
    pub date: NaiveDate,
    pub selectable: bool,
    pub day_blocked: bool,
    pub slots: Vec<SlotView>,
}

impl DayAgenda {
    /// Patient-facing copy: slot states only, no other patients' bookings.
    pub fn public(mut self) -> Self {
        for slot in &mut self.slots {
            slot.appointments.clear();
        }
        self
    }

    pub fn available_slots(&self) -> impl Iterator<Item = TimeSlot> + '_ {
        self.slots
            .iter()
            .filter(|v| v.state == SlotState::Available)
            .map(|v| v.slot)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayOverview {
    pub date: NaiveDate,
    pub selectable: bool,
    pub day_blocked: bool,
    pub appointment_count: usize,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct HourBlockRequest {
    pub date: NaiveDate,
    pub hour: u32,
    #[serde(default)]
    pub minutes: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Result of a toggle: the resulting state of the targeted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockToggleOutcome {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<TimeSlot>,
    pub blocked: bool,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    pub refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub appointment_count: usize,
    pub blocked_day_count: usize,
    pub blocked_slot_count: usize,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityError {
    #[error("Invalid slot schedule: {0}")]
    InvalidSchedule(String),

    #[error("{0} is not a bookable slot")]
    InvalidSlot(String),

    #[error("{date} is outside the booking window ({earliest} to {latest})")]
    OutsideBookingWindow {
        date: NaiveDate,
        earliest: NaiveDate,
        latest: NaiveDate,
    },

    #[error("Invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },

    #[error("Agenda store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for AvailabilityError {
    fn from(err: anyhow::Error) -> Self {
        AvailabilityError::Store(err.to_string())
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Store(msg) => AppError::Database(msg),
            AvailabilityError::InvalidSchedule(msg) => AppError::Internal(msg),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}
