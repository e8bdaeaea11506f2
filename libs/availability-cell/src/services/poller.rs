use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

use shared_config::SchedulingConfig;
use shared_models::appointment::Appointment;

use crate::engine::BookingWindow;
use crate::models::{AvailabilityError, BlockToggleOutcome, BlockedTimes, SnapshotStatus};
use crate::services::store::{AgendaStore, AppointmentQuery};

/// Last known state of the agenda tables.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgendaSnapshot {
    pub appointments: Vec<Appointment>,
    pub blocked_times: BlockedTimes,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Bumped by every local toggle.
    #[serde(skip)]
    pub generation: u64,
}

impl AgendaSnapshot {
    pub fn status(&self) -> SnapshotStatus {
        SnapshotStatus {
            refreshed_at: self.refreshed_at,
            last_error: self.last_error.clone(),
            appointment_count: self.appointments.len(),
            blocked_day_count: self.blocked_times.days.len(),
            blocked_slot_count: self.blocked_times.hours.len(),
        }
    }
}

/// Shared snapshot handed to handlers. The poller is its only regular writer.
#[derive(Debug, Clone, Default)]
pub struct AgendaCache {
    inner: Arc<RwLock<AgendaSnapshot>>,
}

impl AgendaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> AgendaSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn replace(&self, appointments: Vec<Appointment>, blocked_times: BlockedTimes) {
        let mut guard = self.inner.write().await;
        guard.appointments = appointments;
        guard.blocked_times = blocked_times;
        guard.refreshed_at = Some(Utc::now());
        guard.last_error = None;
    }

    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    /// Like `replace`, but drops data read before a toggle landed in the cache.
    pub async fn replace_if_current(
        &self,
        generation: u64,
        appointments: Vec<Appointment>,
        blocked_times: BlockedTimes,
    ) -> bool {
        let mut guard = self.inner.write().await;
        if guard.generation != generation {
            return false;
        }
        guard.appointments = appointments;
        guard.blocked_times = blocked_times;
        guard.refreshed_at = Some(Utc::now());
        guard.last_error = None;
        true
    }

    /// Keeps the previous data and records the failure for display.
    pub async fn record_error(&self, message: String) {
        self.inner.write().await.last_error = Some(message);
    }

    /// Reflect a successful toggle without waiting for the next poll.
    pub async fn apply_toggle(&self, outcome: &BlockToggleOutcome) {
        if !outcome.changed {
            return;
        }
        let mut guard = self.inner.write().await;
        guard.generation += 1;
        match outcome.slot {
            Some(slot) => guard.blocked_times.set_hour(outcome.date, slot, outcome.blocked),
            None => guard.blocked_times.set_day(outcome.date, outcome.blocked),
        }
    }
}

pub struct AgendaPoller {
    store: Arc<dyn AgendaStore>,
    cache: AgendaCache,
    service_token: String,
    interval: Duration,
    window: BookingWindow,
    scheduling: SchedulingConfig,
}

impl AgendaPoller {
    pub fn new(
        store: Arc<dyn AgendaStore>,
        cache: AgendaCache,
        service_token: String,
        scheduling: &SchedulingConfig,
    ) -> Self {
        Self {
            store,
            cache,
            service_token,
            interval: scheduling.poll_interval(),
            window: BookingWindow::from_config(scheduling),
            scheduling: scheduling.clone(),
        }
    }

    pub fn cache(&self) -> &AgendaCache {
        &self.cache
    }

    /// Visible range: start of the current month through the end of the window.
    pub fn visible_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let from = today.with_day(1).unwrap_or(today);
        (from, self.window.latest(today))
    }

    #[instrument(skip(self))]
    pub async fn refresh_once(&self, today: NaiveDate) -> Result<(), AvailabilityError> {
        let (from, to) = self.visible_range(today);
        let generation = self.cache.generation().await;

        let result = async {
            let appointments = self.store
                .fetch_appointments(AppointmentQuery::between(from, to), &self.service_token)
                .await?;
            let blocked = self.store
                .fetch_blocked_times(Some(from), Some(to), &self.service_token)
                .await?;
            anyhow::Ok((appointments, blocked))
        }.await;

        match result {
            Ok((appointments, blocked)) => {
                debug!("Agenda refreshed: {} appointments, {} blocked days, {} blocked slots",
                       appointments.len(), blocked.days.len(), blocked.hours.len());
                if !self.cache.replace_if_current(generation, appointments, blocked).await {
                    debug!("Discarding agenda read that predates a local toggle");
                }
                Ok(())
            }
            Err(e) => {
                error!("Agenda refresh failed: {}", e);
                self.cache.record_error(e.to_string()).await;
                Err(e.into())
            }
        }
    }

    /// Polls until `shutdown` flips to true. A failed tick is retried by the next one.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Agenda poller started (every {:?})", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = self.refresh_once(self.scheduling.clinic_today()).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Agenda poller stopped");
        })
    }
}
