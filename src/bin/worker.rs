use card_status_detect::{app_state::AppState, config::AppConfig, db, routes};
use tracing_subscriber::EnvFilter;

/// Standalone detection worker for deployments that run the HTTP tier with
/// `EMBEDDED_WORKER=false`. Drains the same Redis queue as the server.
#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting card detection worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    if config.redis_url.is_none() {
        tracing::warn!("REDIS_URL not set; this worker will only see its own in-memory queue");
    }

    // Metrics are recorded but not served from this process
    let _prometheus = routes::metrics::install_recorder().ok();

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let state = AppState::from_config(&config, db_pool).expect("Failed to initialize services");

    tracing::info!("Worker ready, starting detection loop");

    state.worker.start();

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received, stopping worker");
}
