//! # hitagd
//!
//! HTTP daemon for hitag presence tracking.
//!
//! This binary provides:
//! - REST API for region events, ranging ticks, presence and session control
//! - Periodic upload of tag transitions to the backend
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! HITAG_ACCESS_SECRET=... cargo run --package hitag-server --bin hitagd
//!
//! # Production
//! HITAG_SERVER__PRODUCTION=true ./hitagd
//! ```
//!
//! `HITAG_CONFIG` points at a TOML file; otherwise the platform default path is
//! used when it exists.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use hitag_core::{default_config_path, HitagConfig};
use hitag_server::api::create_router;
use hitag_server::logging;
use hitag_server::state::{AppState, SharedState};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
const CONFIG_PATH_ENV: &str = "HITAG_CONFIG";

/// Environment variable holding the backend access secret.
const ACCESS_SECRET_ENV: &str = "HITAG_ACCESS_SECRET";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path();
    let config = HitagConfig::load(config_path.as_deref())
        .with_context(|| format!("loading configuration from {config_path:?}"))?;

    let _log_guard = logging::init(config.server.production)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config_path,
        sandbox = config.api.sandbox,
        "Starting hitagd"
    );

    let bind_address = config.server.bind_address.clone();
    let flush_interval = config.upload.interval();
    let state = AppState::new(config)?.shared();

    match std::env::var(ACCESS_SECRET_ENV) {
        Ok(secret) if !secret.trim().is_empty() => {
            state.runtime.auth().set_secret(secret);
            info!("Access secret loaded from environment");
        }
        _ => warn!("No access secret configured; uploads wait until one is set"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flusher = tokio::spawn(flush_periodically(
        state.clone(),
        flush_interval,
        shutdown_rx,
    ));

    let app = create_router(state.clone());
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = flusher.await {
        warn!(error = %e, "Upload task ended abnormally");
    }

    Ok(())
}

/// Config file to load, if any.
fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    default_config_path().ok().filter(|path| path.exists())
}

/// Upload queued scan records every `interval` until shutdown, then once more.
async fn flush_periodically(
    state: SharedState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => flush_once(&state).await,
            _ = shutdown.changed() => break,
        }
    }

    flush_once(&state).await;
}

async fn flush_once(state: &SharedState) {
    let runtime = &state.runtime;
    if runtime.uploader().pending() == 0 {
        return;
    }
    if !runtime.auth().status().has_secret {
        debug!(pending = runtime.uploader().pending(), "Upload skipped, no access secret");
        return;
    }
    // Failures are logged by the pipeline's notifier and the records stay queued.
    let _ = runtime.flush_uploads().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
