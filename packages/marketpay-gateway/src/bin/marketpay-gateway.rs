//! Marketpay gateway binary.

use marketpay_gateway::{create_router, AppState, Config};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Marketpay gateway");

    let config: Config = config::Config::builder()
        .add_source(config::File::with_name("marketpay").required(false))
        .add_source(config::Environment::with_prefix("MARKETPAY"))
        .build()
        .and_then(|c| c.try_deserialize())
        .unwrap_or_else(|e| {
            // Fall back only when nothing is configured; parse errors fail hard.
            let err_str = e.to_string();
            if err_str.contains("not found") || err_str.contains("missing field") {
                warn!(error = %e, "No config found, using defaults");
                Config::default()
            } else {
                error!(error = %e, "FATAL: config error, fix MARKETPAY_* env vars or marketpay.toml");
                std::process::exit(1);
            }
        });

    if config.api_key().is_some() {
        info!("API key auth enabled");
    } else {
        warn!("MARKETPAY_API_KEY not set, payment routes are unprotected (dev mode)");
    }

    info!(
        escrow = %config.escrow_address,
        backend = %config.backend_url,
        validity_secs = config.validity_secs,
        gas_reserve_nano = config.gas_reserve_nano,
        "Configuration loaded"
    );

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = create_router(Arc::clone(&state));

    info!(address = %bind_address, "Listening");
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        cached_records = state.recorder.cached_count(),
        "Gateway shut down gracefully"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
