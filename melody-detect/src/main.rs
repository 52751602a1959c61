//! melody-detect - Main entry point
//!
//! HTTP service that fans uploaded audio out to AI-music detection providers
//! and reports a reconciled verdict.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use melody_common::events::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use melody_detect::config::DetectConfig;
use melody_detect::services::{DetectionOrchestrator, TokenCache};
use melody_detect::{build_router, AppState};

/// Command-line arguments for melody-detect
#[derive(Parser, Debug)]
#[command(name = "melody-detect")]
#[command(about = "AI-generated music detection across multiple providers")]
#[command(version)]
struct Args {
    /// Path to melody-detect.toml
    #[arg(short, long, env = "MELODY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides PORT and the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "MELODY_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so both clap and the config loader see its values
    let dotenv_path = dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = DetectConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("melody_detect={level},melody_common={level},tower_http=info", level = config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting melody-detect v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = dotenv_path {
        info!("Loaded environment from {}", path.display());
    }

    let tokens = Arc::new(TokenCache::new());
    let registry = config
        .build_registry(tokens)
        .context("Failed to configure detection providers")?;
    if registry.is_empty() {
        warn!("Service is running without providers; set provider credentials to enable detection");
    }

    let event_bus = EventBus::new(config.jobs.event_capacity.max(1));
    let orchestrator = Arc::new(DetectionOrchestrator::new(registry, event_bus.clone()));

    let shutdown = CancellationToken::new();
    let sweeper = orchestrator.spawn_retention_sweeper(
        config.jobs.retention(),
        config.jobs.sweep_interval(),
        shutdown.clone(),
    );

    let state = AppState::new(orchestrator, event_bus);
    let app = build_router(state, config.server.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                config.server.bind_address, config.server.port
            )
        })?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Retention sweeper ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
