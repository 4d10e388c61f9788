use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hubgate::broadcast::{Broadcaster, DeliveryFailure};
use hubgate::config::HubgateConfig;
use hubgate::http::{AppState, HttpServer};
use hubgate::ratelimit::{RateLimiter, Sweeper};

/// Per-client rate limiting and server-push event fan-out.
#[derive(Debug, Parser)]
#[command(name = "hubgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "HUBGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Hubgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = HubgateConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.http_addr {
        config.server.http_addr = addr;
    }
    info!(
        http_addr = %config.server.http_addr,
        default_limit = config.rate_limiting.default_limit,
        default_window_ms = config.rate_limiting.default_window_ms,
        policies = config.rate_limiting.policies.len(),
        "Configuration loaded"
    );

    let rate_limiter = Arc::new(
        RateLimiter::new().with_defaults(config.rate_limiting.default_policy()),
    );
    let sweeper = Sweeper::spawn(rate_limiter.clone(), config.rate_limiting.sweep_interval());

    let broadcaster = Broadcaster::with_failure_hook(Arc::new(|failure: &DeliveryFailure| {
        info!(channel = %failure.channel, reason = %failure.error, "Subscriber dropped");
    }));

    let state = AppState::new(rate_limiter, broadcaster.clone(), &config);
    let server = HttpServer::bind(config.server.http_addr, state).await?;

    // Open event streams only finish once their channels are closed
    let shutdown = async move {
        shutdown_signal().await;
        let closed = broadcaster.close_all();
        info!(closed = closed, "Closed subscriber streams");
    };

    server.serve_with_shutdown(shutdown).await?;
    sweeper.shutdown().await;

    info!("Hubgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
