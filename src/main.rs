use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scanguard::admission::{AdmissionDecider, Reaper};
use scanguard::clock::{Clock, SystemClock};
use scanguard::config::ScanguardConfig;
use scanguard::http::HttpServer;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "scanguard")]
#[command(about = "Per-client admission control for the product scan pipeline")]
#[command(version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Scanguard admission service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = ScanguardConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }
    let admission = &config.admission;
    info!(
        http_addr = %config.server.http_addr,
        max_requests = admission.max_requests,
        window_secs = admission.window_secs,
        block_secs = admission.block_secs,
        cooldown_secs = admission.cooldown_secs,
        allow_list = admission.allow_list.len(),
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let decider = Arc::new(AdmissionDecider::new(admission, clock.clone()));

    let reaper = Reaper::new(
        decider.window_counter().clone(),
        decider.cooldown_gate().clone(),
        clock,
        admission.sweep_interval(),
    )
    .spawn();

    let server = HttpServer::new(config.server.http_addr, decider);

    // Run the server with graceful shutdown on Ctrl+C
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    reaper.abort();
    result?;

    info!("Scanguard admission service stopped");
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
