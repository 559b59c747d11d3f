//! fifoq server entrypoint.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use fifoq::fifo::FifoManager;
use fifoq::store::SqliteConfig;
use fifoq::{duration, http, telemetry};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Wait for ctrl-c or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                warn!(error = %e, "failed to install ctrl-c handler, continuing without it");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, continuing without it");
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

    info!("shutdown signal received");
    let _ = shutdown_tx.send(());
}

fn reaper_interval_from_env() -> Duration {
    match std::env::var("REAPER_INTERVAL") {
        Ok(s) => match duration::parse(&s) {
            Ok(d) if !d.is_zero() => d,
            _ => {
                warn!(value = %s, "invalid REAPER_INTERVAL, using default");
                DEFAULT_REAPER_INTERVAL
            }
        },
        Err(_) => DEFAULT_REAPER_INTERVAL,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let config = SqliteConfig::from_env();
    let manager =
        match FifoManager::open_with_pull_rate(config.clone(), reaper_interval_from_env()) {
            Ok(m) => m,
            Err(e) => {
                error!(path = %config.path.display(), error = %e, "failed to open store");
                std::process::exit(1);
            }
        };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    tokio::spawn(shutdown_signal(shutdown_tx.clone()));

    tokio::spawn(Arc::clone(&manager).run_reaper(shutdown_tx.subscribe()));

    let listen_addr =
        std::env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %listen_addr,
        path = %config.path.display(),
        "fifoq server ready"
    );

    let router = http::create_router(manager);
    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    info!("shutdown complete");
    Ok(())
}
