//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::error::StartupError;
use api::{AppState, Backend, Stores};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Runs the server on one backend until a shutdown signal arrives.
async fn serve<B: Backend>(
    config: Config,
    stores: Stores<B>,
    metrics_handle: PrometheusHandle,
) -> Result<(), StartupError> {
    let state = Arc::new(AppState::new(&config, stores)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = state.start_background(&config, shutdown_rx).await?;

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "expiry sweeper task failed");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the storage backend and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await?;
            sqlx::migrate!("../../migrations").run(&pool).await?;
            tracing::info!("connected to PostgreSQL, migrations applied");

            let stores = Stores::postgres(pool, &config);
            serve(config, stores, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            let stores = Stores::in_memory(&config);
            serve(config, stores, metrics_handle).await
        }
    }
}
