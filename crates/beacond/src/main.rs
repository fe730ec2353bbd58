//! beacond — the beacon demo service daemon.
//!
//! Single binary that assembles the service:
//! - Metric registry + HTTP request instrumentation
//! - Optional DogStatsD side channel for signup events
//! - axum routes with the timing middleware
//!
//! # Usage
//!
//! ```text
//! beacond serve --port 8080 --statsd-addr 127.0.0.1:8125
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use beacon_api::AppState;
use beacon_metrics::Registry;
use beacon_statsd::StatsdClient;

#[derive(Parser)]
#[command(name = "beacond", about = "Beacon demo service daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// DogStatsD agent address for the signup side channel.
        /// Omit to disable the push path.
        #[arg(long)]
        statsd_addr: Option<SocketAddr>,

        /// Artificial delay of the /slow endpoint, in milliseconds.
        #[arg(long, default_value = "2000")]
        slow_delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,beacond=debug,beacon=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            statsd_addr,
            slow_delay_ms,
        } => serve(port, statsd_addr, slow_delay_ms).await,
    }
}

async fn serve(
    port: u16,
    statsd_addr: Option<SocketAddr>,
    slow_delay_ms: u64,
) -> anyhow::Result<()> {
    info!("beacon daemon starting");

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    let statsd = match statsd_addr {
        Some(addr) => {
            let client = StatsdClient::bind(addr).await?;
            info!(%addr, "statsd side channel enabled");
            client
        }
        None => {
            info!("statsd side channel disabled");
            StatsdClient::disabled()
        }
    };

    // A duplicate metric name means an inconsistent registry; refuse to
    // serve traffic rather than start with it.
    let registry = Registry::new();
    let state = AppState::new(
        registry,
        statsd,
        hostname,
        Duration::from_millis(slow_delay_ms),
    )
    .context("metric registration failed")?;

    let router = beacon_api::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "HTTP server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    info!("beacon daemon stopped");
    Ok(())
}
