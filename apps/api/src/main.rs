use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use availability_cell::handlers::AvailabilityState;
use availability_cell::services::{AgendaCache, AgendaPoller, SupabaseAgendaStore};
use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic agenda API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    // Agenda snapshot shared by the public availability endpoints
    let cache = AgendaCache::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = if config.is_poller_configured() {
        let store = Arc::new(SupabaseAgendaStore::new(&config));
        let poller = Arc::new(AgendaPoller::new(
            store,
            cache.clone(),
            config.supabase_service_role_key.clone(),
            &config.scheduling,
        ));
        Some(poller)
    } else {
        warn!("Service role key missing, public availability will stay empty");
        None
    };

    let poller_task = poller
        .as_ref()
        .map(|p| Arc::clone(p).spawn(shutdown_rx));

    let availability = AvailabilityState::new(Arc::clone(&config), cache, poller);

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(Arc::clone(&config), availability)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop polling once the server has drained
    shutdown_tx.send(true).ok();
    if let Some(task) = poller_task {
        task.await?;
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
