// libs/availability-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_staff;

use crate::engine::{self, BookingWindow, SlotSchedule};
use crate::models::{DateRangeQuery, DayAgenda, HourBlockRequest, TimeSlot};
use crate::services::{
    AgendaCache, AgendaPoller, AgendaStore, AppointmentQuery, BlockingService, SupabaseAgendaStore,
};

#[derive(Clone)]
pub struct AvailabilityState {
    pub config: Arc<AppConfig>,
    pub cache: AgendaCache,
    pub poller: Option<Arc<AgendaPoller>>,
}

impl AvailabilityState {
    pub fn new(config: Arc<AppConfig>, cache: AgendaCache, poller: Option<Arc<AgendaPoller>>) -> Self {
        Self { config, cache, poller }
    }

    fn schedule(&self) -> Result<SlotSchedule, AppError> {
        Ok(SlotSchedule::from_config(&self.config.scheduling)?)
    }

    fn window(&self) -> BookingWindow {
        BookingWindow::from_config(&self.config.scheduling)
    }

    fn today(&self) -> NaiveDate {
        self.config.scheduling.clinic_today()
    }
}

// ==============================================================================
// PUBLIC HANDLERS (served from the polled snapshot)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<AvailabilityState>,
) -> Result<Json<Value>, AppError> {
    let schedule = state.schedule()?;
    let window = state.window();
    let today = state.today();

    Ok(Json(json!({
        "schedule": schedule,
        "slots": schedule.slots().map(|s| s.to_string()).collect::<Vec<_>>(),
        "window": {
            "min_lead_days": window.min_lead_days,
            "max_horizon_months": window.max_horizon_months,
            "earliest": window.earliest(today),
            "latest": window.latest(today),
        },
        "today": today,
    })))
}

#[axum::debug_handler]
pub async fn get_public_day(
    State(state): State<AvailabilityState>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<DayAgenda>, AppError> {
    let schedule = state.schedule()?;
    let snapshot = state.cache.snapshot().await;

    let agenda = engine::day_agenda(
        date,
        state.today(),
        &schedule,
        &state.window(),
        &snapshot.appointments,
        &snapshot.blocked_times,
    );

    Ok(Json(agenda.public()))
}

#[axum::debug_handler]
pub async fn get_month_overview(
    State(state): State<AvailabilityState>,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<Value>, AppError> {
    let snapshot = state.cache.snapshot().await;

    let days = engine::month_overview(
        year,
        month,
        state.today(),
        &state.window(),
        &snapshot.appointments,
        &snapshot.blocked_times,
    )?;

    Ok(Json(json!({
        "year": year,
        "month": month,
        "days": days,
        "refreshed_at": snapshot.refreshed_at,
        "error": snapshot.last_error,
    })))
}

// ==============================================================================
// STAFF HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_blocked_times(
    State(state): State<AvailabilityState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = BlockingService::new(&state.config)?;
    let blocked = service.get_blocked_times(range.from, range.to, auth.token()).await?;

    Ok(Json(json!(blocked)))
}

#[axum::debug_handler]
pub async fn toggle_day_block(
    State(state): State<AvailabilityState>,
    Path(date): Path<NaiveDate>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = BlockingService::new(&state.config)?;
    let outcome = service.toggle_day_block(date, state.today(), auth.token()).await?;
    state.cache.apply_toggle(&outcome).await;

    Ok(Json(json!({
        "success": true,
        "toggle": outcome,
    })))
}

#[axum::debug_handler]
pub async fn toggle_hour_block(
    State(state): State<AvailabilityState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<HourBlockRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let slot = TimeSlot::new(request.hour, request.minutes)?;
    let service = BlockingService::new(&state.config)?;
    let outcome = service
        .toggle_hour_block(request.date, slot, state.today(), auth.token())
        .await?;
    state.cache.apply_toggle(&outcome).await;

    Ok(Json(json!({
        "success": true,
        "toggle": outcome,
        "message": if outcome.changed { "Slot updated" } else { "Slot has an appointment and cannot be blocked" },
    })))
}

/// Doctor day view with occupying appointments, read fresh from the store.
#[axum::debug_handler]
pub async fn get_staff_agenda(
    State(state): State<AvailabilityState>,
    Path(date): Path<NaiveDate>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<DayAgenda>, AppError> {
    require_staff(&user)?;

    let store = SupabaseAgendaStore::new(&state.config);
    let token = auth.token();
    let appointments = store
        .fetch_appointments(AppointmentQuery::on(date), token)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    let blocked = store
        .fetch_blocked_times(Some(date), Some(date), token)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    let agenda = engine::day_agenda(
        date,
        state.today(),
        &state.schedule()?,
        &state.window(),
        &appointments,
        &blocked,
    );

    Ok(Json(agenda))
}

#[axum::debug_handler]
pub async fn refresh_agenda(
    State(state): State<AvailabilityState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let poller = state
        .poller
        .as_ref()
        .ok_or_else(|| AppError::ExternalService("Agenda poller is not configured".to_string()))?;

    let refreshed = poller.refresh_once(state.today()).await;
    let status = state.cache.snapshot().await.status();

    Ok(Json(json!({
        "success": refreshed.is_ok(),
        "status": status,
    })))
}
