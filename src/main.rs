use axum::routing::get;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::EnvFilter;

use card_status_detect::{app_state::AppState, config::AppConfig, db, routes};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing card-status-detect server");

    let prometheus_handle =
        routes::metrics::install_recorder().expect("Failed to install Prometheus metrics recorder");

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let state = AppState::from_config(&config, db_pool).expect("Failed to initialize services");

    state
        .visit_limiter
        .spawn_sweeper(Duration::from_secs(config.rate_limit_sweep_secs));
    state
        .admin_limiter
        .spawn_sweeper(Duration::from_secs(config.rate_limit_sweep_secs));

    if config.embedded_worker {
        state.worker.start();
    } else {
        tracing::info!("Embedded worker disabled, expecting a standalone worker process");
    }

    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024));

    tracing::info!("Starting card-status-detect on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
