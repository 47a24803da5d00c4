//! atr-submit - Target observation relay
//!
//! Accepts observation submissions over HTTP (raw JSON or a multipart capture
//! with an image), normalizes them into envelopes and publishes each envelope
//! to an MQTT topic before answering the client.

use std::sync::Arc;

use anyhow::{Context, Result};
use atr_common::config::{load_toml_config, RelayConfig};
use atr_common::time::SystemClock;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atr_submit::cli::Args;
use atr_submit::services::{
    CloudinaryIngestor, DisabledIngestor, ImageIngestor, MqttConnector, Publisher,
    SubmissionService,
};
use atr_submit::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config comes before tracing so the configured level can seed the filter
    let file = match args.config_path() {
        Some(path) => load_toml_config(&path).context("Failed to load config file")?,
        None => None,
    };
    let config = RelayConfig::resolve(args.overrides(), file).context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &config.log_level;
                format!("atr_submit={level},atr_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting atr-submit v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let endpoint = config.broker_endpoint().context("Invalid broker URL")?;
    info!(
        "Broker: {} topic={} qos={} deadline={}ms",
        endpoint,
        config.topic,
        config.qos,
        config.publish_timeout.as_millis()
    );

    let connector = Arc::new(MqttConnector::new(endpoint));
    let publisher = Publisher::new(connector, config.client_id_prefix.clone());

    let ingestor: Arc<dyn ImageIngestor> = match config.image_store.credentials() {
        Some(credentials) => {
            let cloudinary = CloudinaryIngestor::new(credentials, &config.image_store.folder)
                .context("Failed to initialize image store client")?;
            info!("Image store: {}", cloudinary.upload_url());
            Arc::new(cloudinary)
        }
        None => {
            warn!("Image store credentials not set - form submissions will fail at upload");
            Arc::new(DisabledIngestor)
        }
    };

    let bind_addr = config.bind_addr.clone();
    let service = Arc::new(SubmissionService::new(
        Arc::new(config),
        publisher,
        ingestor,
        Arc::new(SystemClock),
    ));
    let app = build_router(AppState::new(service));

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", bind_addr, e);
            return Err(e).context("Failed to bind to address");
        }
    };
    info!("atr-submit listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
