use std::sync::Arc;

use order_dispatch::api;
use order_dispatch::config::{Config, LogFormat};
use order_dispatch::engine::matching::run_matching_engine;
use order_dispatch::error::AppError;
use order_dispatch::integrations::identity::JwtIdentityProvider;
use order_dispatch::state::AppState;
use order_dispatch::store::seed;
use tracing_subscriber::EnvFilter;

const DEV_JWT_SECRET: &str = "order-dispatch-dev-secret";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let secret = match config.jwt_secret.as_deref() {
        Some(secret) => secret,
        None => {
            tracing::warn!("JWT_SECRET not set; using the development secret");
            DEV_JWT_SECRET
        }
    };
    let identity = Arc::new(JwtIdentityProvider::new(secret));

    let (app_state, match_rx) = AppState::new(&config, identity);
    let shared_state = Arc::new(app_state);

    if let Some(path) = config.seed_path.as_deref() {
        seed::load(path, &shared_state.store).await?;
    }

    tokio::spawn(run_matching_engine(
        Arc::clone(&shared_state.deliveries),
        shared_state.metrics.clone(),
        match_rx,
    ));

    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
