use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use menu_recognition::{
    app_state::AppState,
    config::AppConfig,
    db::{self, catalog_queries::PgCatalog, queries::PgJobStore, user_queries::PgUserDirectory},
    routes,
    services::{
        auth::TokenKeys, orchestrator::JobOrchestrator, recognizer::ProcessRecognizer,
        storage::UploadStorage,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing menu-recognition server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url, config.max_concurrent_recognitions)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let storage = UploadStorage::open(&config.upload_dir)
        .await
        .expect("Failed to open upload directory");

    tokio::fs::create_dir_all(&config.results_dir)
        .await
        .expect("Failed to create recognizer results directory");

    let auth = TokenKeys::new(&config.jwt_secret).expect("Failed to initialize token keys");

    tracing::info!(
        command = %config.recognizer_command,
        workers = config.max_concurrent_recognitions,
        queue_capacity = config.job_queue_capacity,
        timeout_secs = ?config.recognizer_timeout_secs,
        "Starting recognition workers"
    );
    let recognizer = ProcessRecognizer::new(
        config.recognizer_command.clone(),
        config.recognizer_args.clone(),
        config.results_dir.clone(),
    );
    let catalog = Arc::new(PgCatalog::new(db_pool.clone()));
    let jobs = JobOrchestrator::start(
        Arc::new(PgJobStore::new(db_pool.clone())),
        catalog.clone(),
        Arc::new(recognizer),
        config.orchestrator(),
    );

    let state = AppState::new(
        db_pool.clone(),
        storage,
        auth,
        Arc::new(PgUserDirectory::new(db_pool)),
        catalog,
        jobs,
    );

    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
