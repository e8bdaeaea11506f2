// libs/availability-cell/src/router.rs
use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AvailabilityState};

pub fn availability_routes(state: AvailabilityState) -> Router {
    // Patient-facing views, no appointment details
    let public_routes = Router::new()
        .route("/config", get(handlers::get_schedule))
        .route("/days/{date}", get(handlers::get_public_day))
        .route("/months/{year}/{month}", get(handlers::get_month_overview));

    // Agenda administration for doctors and admins
    let protected_routes = Router::new()
        .route("/blocked", get(handlers::get_blocked_times))
        .route("/blocked/days/{date}", post(handlers::toggle_day_block))
        .route("/blocked/hours", post(handlers::toggle_hour_block))
        .route("/agenda/{date}", get(handlers::get_staff_agenda))
        .route("/refresh", post(handlers::refresh_agenda))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
