//! HTTP host for the document-store session store.
//!
//! This server:
//! - Connects to the configured document store and declares its indexes
//! - Serves read/write/destroy/gc over HTTP, one session cycle per request
//! - Runs a periodic soft gc sweep in the background

use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod handlers;
mod sweeper;

use config::Config;
use handlers::{router, AppState};
use sweeper::spawn_gc_sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let session_config = config.session_config();

    info!("Starting session-store-http v{}", env!("CARGO_PKG_VERSION"));
    info!("  Host: {}", config.host);
    info!("  Port: {}", config.port);
    info!("  Targets: {}", session_config.hosts.join(", "));
    info!("  Lifetime: {}s", session_config.lifetime);

    // Configuration errors are fatal: no indexes, no lock guarantees.
    let sessions = session_store_local::open_session_store(&session_config).await?;

    let sweeper = spawn_gc_sweeper(sessions.clone(), Duration::from_secs(config.gc_interval_secs));

    let app = router(AppState { sessions }).layer(TraceLayer::new_for_http());

    // Bind and serve
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, initiating shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
        info!("Received SIGTERM, initiating shutdown");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
