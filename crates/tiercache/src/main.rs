//! tiercache - origin server for a tiered key/value cache

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tiercache_core::{PersistMode, PersistenceService};
use tiercache_storage::ObjectStoreBackend;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, LoggingConfig};
use tiercache_api::{AppState, create_router};

/// tiercache - origin server for a tiered key/value cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "TIERCACHE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "TIERCACHE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    init_logging(&config.logging)?;

    info!("Starting tiercache v{}", env!("CARGO_PKG_VERSION"));

    let settings = config.keyval_settings()?;

    // Durable tier
    let persistence = if settings.persist.enabled == PersistMode::Disabled {
        info!("Persistence disabled");
        None
    } else {
        let store = Arc::new(ObjectStoreBackend::new(config.persist.store.clone()));
        info!(
            "Persistence: {} to {} bucket {:?}",
            settings.persist.enabled.as_str(),
            config.persist.store.as_str(),
            settings.persist.bucket
        );
        Some(Arc::new(PersistenceService::new(store)))
    };

    // Metrics
    let metrics_handle = if config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install metrics recorder")?;
        Some(Arc::new(handle))
    } else {
        None
    };

    let state = AppState::new(settings, persistence);

    let app = create_router(state, metrics_handle).layer(TraceLayer::new_for_http());

    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind_addr, port))?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => subscriber.with(fmt::layer().json()).try_init()?,
        _ => subscriber.with(fmt::layer()).try_init()?,
    }
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
