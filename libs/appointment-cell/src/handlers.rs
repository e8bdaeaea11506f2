// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::{require_role, require_staff};

use crate::models::{CreateAppointmentRequest, RespondRequest, StatusDecision};
use crate::services::booking::AppointmentBookingService;
use crate::services::validation::validate_request;

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQueryParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn booking_service(config: &AppConfig) -> Result<AppointmentBookingService, AppError> {
    Ok(AppointmentBookingService::new(config)?)
}

// ==============================================================================
// PATIENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Patient)?;

    let appointment = booking_service(&state)?
        .create_appointment(&user, request, state.scheduling.clinic_today(), auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment request sent"
    })))
}

/// Field checks only, so the form can show inline errors before submitting.
#[axum::debug_handler]
pub async fn validate_appointment(
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    validate_request(&request).map_err(AppError::InvalidFields)?;

    Ok(Json(json!({
        "valid": true
    })))
}

#[axum::debug_handler]
pub async fn rerequest_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = booking_service(&state)?
        .rerequest(appointment_id, &user, state.scheduling.clinic_today(), auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    booking_service(&state)?
        .delete_appointment(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "deleted": appointment_id
    })))
}

// ==============================================================================
// SHARED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AppointmentQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointments = booking_service(&state)?
        .list_appointments(&user, params.from, params.to, auth.token())
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

// ==============================================================================
// DOCTOR HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn accept_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    body: Option<Json<RespondRequest>>,
) -> Result<Json<Value>, AppError> {
    respond(state, appointment_id, StatusDecision::Accept, auth, user, body).await
}

#[axum::debug_handler]
pub async fn decline_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    body: Option<Json<RespondRequest>>,
) -> Result<Json<Value>, AppError> {
    respond(state, appointment_id, StatusDecision::Decline, auth, user, body).await
}

async fn respond(
    state: Arc<AppConfig>,
    appointment_id: Uuid,
    decision: StatusDecision,
    auth: Authorization<Bearer>,
    user: User,
    body: Option<Json<RespondRequest>>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let message = body.and_then(|Json(b)| b.message);
    let appointment = booking_service(&state)?
        .respond(appointment_id, decision, &user, message, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": decision.message()
    })))
}
