// libs/availability-cell/src/services/blocking.rs
use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;

use crate::engine::{self, BookingWindow, SlotSchedule};
use crate::models::{
    AvailabilityError, BlockEntry, BlockToggleOutcome, BlockedTimes, HourBlock, TimeSlot,
};
use crate::services::store::{AgendaStore, AppointmentQuery, SupabaseAgendaStore};

/// Doctor-side administration of day and hour blocks.
pub struct BlockingService {
    store: SupabaseAgendaStore,
    schedule: SlotSchedule,
    window: BookingWindow,
}

impl BlockingService {
    pub fn new(config: &AppConfig) -> Result<Self, AvailabilityError> {
        Ok(Self {
            store: SupabaseAgendaStore::new(config),
            schedule: SlotSchedule::from_config(&config.scheduling)?,
            window: BookingWindow::from_config(&config.scheduling),
        })
    }

    pub async fn get_blocked_times(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<BlockedTimes, AvailabilityError> {
        Ok(self.store.fetch_blocked_times(from, to, auth_token).await?)
    }

    #[instrument(skip(self, auth_token))]
    pub async fn toggle_day_block(
        &self,
        date: NaiveDate,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<BlockToggleOutcome, AvailabilityError> {
        self.window.check(today, date)?;

        let current = self.store.fetch_blocked_times(Some(date), Some(date), auth_token).await?;
        let was_blocked = current.is_day_blocked(date);
        let next = engine::toggle_day_block(date, current);
        let now_blocked = next.is_day_blocked(date);

        let entry = BlockEntry::Day(date);
        if now_blocked {
            self.store.insert_block(entry, auth_token).await?;
        } else {
            self.store.delete_block(entry, auth_token).await?;
        }

        info!("Day {} {}", date, if now_blocked { "blocked" } else { "unblocked" });
        Ok(BlockToggleOutcome {
            date,
            slot: None,
            blocked: now_blocked,
            changed: was_blocked != now_blocked,
        })
    }

    #[instrument(skip(self, auth_token))]
    pub async fn toggle_hour_block(
        &self,
        date: NaiveDate,
        slot: TimeSlot,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<BlockToggleOutcome, AvailabilityError> {
        self.window.check(today, date)?;
        self.schedule.require(slot)?;

        let current = self.store.fetch_blocked_times(Some(date), Some(date), auth_token).await?;
        let appointments = self.store.fetch_appointments(AppointmentQuery::on(date), auth_token).await?;

        let was_blocked = current.has_hour_block(date, slot);
        let next = engine::toggle_hour_block(date, slot, current, &appointments);
        let now_blocked = next.has_hour_block(date, slot);

        if was_blocked == now_blocked {
            warn!("Refusing to block {} on {}: slot is occupied", slot, date);
            return Ok(BlockToggleOutcome {
                date,
                slot: Some(slot),
                blocked: now_blocked,
                changed: false,
            });
        }

        let entry = BlockEntry::Hour(HourBlock { date, slot });
        if now_blocked {
            self.store.insert_block(entry, auth_token).await?;
        } else {
            self.store.delete_block(entry, auth_token).await?;
        }

        debug!("Slot {} on {} now blocked={}", slot, date, now_blocked);
        Ok(BlockToggleOutcome {
            date,
            slot: Some(slot),
            blocked: now_blocked,
            changed: true,
        })
    }
}
