// libs/availability-cell/src/engine.rs
//
// Pure slot availability rules. Everything here works on explicit snapshots
// of appointments and blocked times; no I/O, no clock reads.

use std::iter::FusedIterator;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;

use shared_config::SchedulingConfig;
use shared_models::appointment::Appointment;

use crate::models::{
    AvailabilityError, BlockedTimes, DayAgenda, DayOverview, SlotState, SlotView, TimeSlot,
};

// ==============================================================================
// SLOT GENERATION
// ==============================================================================

/// Validated opening hours and slot granularity. The end hour is inclusive:
/// 08:00..=18:00 at 30 minutes yields 21 slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotSchedule {
    pub start_hour: u32,
    pub end_hour: u32,
    pub granularity_minutes: u32,
}

impl SlotSchedule {
    pub fn new(start_hour: u32, end_hour: u32, granularity_minutes: u32) -> Result<Self, AvailabilityError> {
        if granularity_minutes == 0 || granularity_minutes > 60 * 24 {
            return Err(AvailabilityError::InvalidSchedule(format!(
                "granularity must be between 1 and 1440 minutes, got {}",
                granularity_minutes
            )));
        }
        if end_hour > 23 {
            return Err(AvailabilityError::InvalidSchedule(format!(
                "end hour must be at most 23, got {}",
                end_hour
            )));
        }
        if start_hour > end_hour {
            return Err(AvailabilityError::InvalidSchedule(format!(
                "start hour {} is after end hour {}",
                start_hour, end_hour
            )));
        }
        Ok(Self { start_hour, end_hour, granularity_minutes })
    }

    pub fn from_config(config: &SchedulingConfig) -> Result<Self, AvailabilityError> {
        Self::new(config.start_hour, config.end_hour, config.slot_minutes)
    }

    pub fn slots(&self) -> Slots {
        Slots {
            next: self.start_hour * 60,
            last: self.end_hour * 60,
            step: self.granularity_minutes,
        }
    }

    /// Whether `slot` is one of the generated slots.
    pub fn contains(&self, slot: TimeSlot) -> bool {
        let minute = slot.minute_of_day();
        let first = self.start_hour * 60;
        slot.minutes < 60
            && minute >= first
            && minute <= self.end_hour * 60
            && (minute - first) % self.granularity_minutes == 0
    }

    pub fn require(&self, slot: TimeSlot) -> Result<(), AvailabilityError> {
        if self.contains(slot) {
            Ok(())
        } else {
            Err(AvailabilityError::InvalidSlot(slot.to_string()))
        }
    }
}

/// Ordered, finite slot sequence. Clone it to iterate again from the start.
#[derive(Debug, Clone)]
pub struct Slots {
    next: u32,
    last: u32,
    step: u32,
}

impl Iterator for Slots {
    type Item = TimeSlot;

    fn next(&mut self) -> Option<TimeSlot> {
        if self.next > self.last {
            return None;
        }
        let minute = self.next;
        self.next += self.step;
        Some(TimeSlot { hour: minute / 60, minutes: minute % 60 })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.next > self.last {
            0
        } else {
            ((self.last - self.next) / self.step + 1) as usize
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Slots {}
impl FusedIterator for Slots {}

pub fn generate_slots(start_hour: u32, end_hour: u32, granularity_minutes: u32) -> Result<Slots, AvailabilityError> {
    Ok(SlotSchedule::new(start_hour, end_hour, granularity_minutes)?.slots())
}

// ==============================================================================
// BLOCKING & CONFLICTS
// ==============================================================================

pub fn is_slot_blocked(date: NaiveDate, slot: TimeSlot, blocked: &BlockedTimes) -> bool {
    blocked.is_day_blocked(date) || blocked.has_hour_block(date, slot)
}

/// Non-declined appointments starting exactly at `slot` on `date`.
pub fn appointments_for_slot<'a>(
    date: NaiveDate,
    slot: TimeSlot,
    appointments: &'a [Appointment],
) -> Vec<&'a Appointment> {
    appointments
        .iter()
        .filter(|a| occupies(a, date, slot))
        .collect()
}

fn occupies(appointment: &Appointment, date: NaiveDate, slot: TimeSlot) -> bool {
    appointment.occupies_slot()
        && appointment.date() == date
        && appointment.hour() == slot.hour
        && appointment.minutes() == slot.minutes
}

fn is_slot_occupied(date: NaiveDate, slot: TimeSlot, appointments: &[Appointment]) -> bool {
    appointments.iter().any(|a| occupies(a, date, slot))
}

pub fn is_slot_available(
    date: NaiveDate,
    slot: TimeSlot,
    appointments: &[Appointment],
    blocked: &BlockedTimes,
) -> bool {
    !is_slot_blocked(date, slot, blocked) && !is_slot_occupied(date, slot, appointments)
}

/// Flips the day-block for `date`. Hour-blocks on that date are left as they are.
pub fn toggle_day_block(date: NaiveDate, mut blocked: BlockedTimes) -> BlockedTimes {
    let now_blocked = !blocked.is_day_blocked(date);
    blocked.set_day(date, now_blocked);
    blocked
}

/// Flips the hour-block entry for `(date, slot)`. Adding a block over an
/// occupied slot is refused and the input is returned unchanged; removing an
/// existing entry is always allowed. Day-blocks are never touched.
pub fn toggle_hour_block(
    date: NaiveDate,
    slot: TimeSlot,
    mut blocked: BlockedTimes,
    appointments: &[Appointment],
) -> BlockedTimes {
    if blocked.has_hour_block(date, slot) {
        blocked.set_hour(date, slot, false);
    } else if !is_slot_occupied(date, slot, appointments) {
        blocked.set_hour(date, slot, true);
    }
    blocked
}

// ==============================================================================
// BOOKING WINDOW
// ==============================================================================

/// Dates `today + min_lead_days ..= today + max_horizon_months` are selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookingWindow {
    pub min_lead_days: u32,
    pub max_horizon_months: u32,
}

impl Default for BookingWindow {
    fn default() -> Self {
        Self { min_lead_days: 2, max_horizon_months: 3 }
    }
}

impl BookingWindow {
    pub fn new(min_lead_days: u32, max_horizon_months: u32) -> Self {
        Self { min_lead_days, max_horizon_months }
    }

    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self::new(config.min_lead_days, config.max_horizon_months)
    }

    pub fn earliest(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_add_days(Days::new(u64::from(self.min_lead_days)))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Calendar months; a day past the end of the target month clamps to its last day.
    pub fn latest(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_add_months(Months::new(self.max_horizon_months))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, today: NaiveDate, date: NaiveDate) -> bool {
        self.earliest(today) <= date && date <= self.latest(today)
    }

    pub fn check(&self, today: NaiveDate, date: NaiveDate) -> Result<(), AvailabilityError> {
        if self.contains(today, date) {
            Ok(())
        } else {
            Err(AvailabilityError::OutsideBookingWindow {
                date,
                earliest: self.earliest(today),
                latest: self.latest(today),
            })
        }
    }
}

// ==============================================================================
// VIEWS
// ==============================================================================

pub fn day_agenda(
    date: NaiveDate,
    today: NaiveDate,
    schedule: &SlotSchedule,
    window: &BookingWindow,
    appointments: &[Appointment],
    blocked: &BlockedTimes,
) -> DayAgenda {
    let selectable = window.contains(today, date);
    let day_blocked = blocked.is_day_blocked(date);

    let slots = schedule
        .slots()
        .map(|slot| {
            let occupying: Vec<Appointment> = appointments_for_slot(date, slot, appointments)
                .into_iter()
                .cloned()
                .collect();

            let state = if !selectable {
                SlotState::Disabled
            } else if is_slot_blocked(date, slot, blocked) {
                SlotState::Blocked
            } else if !occupying.is_empty() {
                SlotState::Booked
            } else {
                SlotState::Available
            };

            SlotView {
                slot,
                label: slot.to_string(),
                state,
                hour_blocked: blocked.has_hour_block(date, slot),
                appointments: occupying,
            }
        })
        .collect();

    DayAgenda { date, selectable, day_blocked, slots }
}

pub fn month_overview(
    year: i32,
    month: u32,
    today: NaiveDate,
    window: &BookingWindow,
    appointments: &[Appointment],
    blocked: &BlockedTimes,
) -> Result<Vec<DayOverview>, AvailabilityError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(AvailabilityError::InvalidMonth { year, month })?;

    let days = first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| DayOverview {
            date,
            selectable: window.contains(today, date),
            day_blocked: blocked.is_day_blocked(date),
            appointment_count: appointments
                .iter()
                .filter(|a| a.occupies_slot() && a.date() == date)
                .count(),
        })
        .collect();

    Ok(days)
}
