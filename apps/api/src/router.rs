use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use availability_cell::handlers::AvailabilityState;
use availability_cell::router::availability_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>, availability: AvailabilityState) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic agenda API is running!" }))
        .nest("/availability", availability_routes(availability))
        .nest("/appointments", appointment_routes(state))
}
