//! Taskboard server: JSON API for tasks and the users they are assigned to.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:4000
//! cargo run --bin taskboard-server
//!
//! # Run on custom address
//! cargo run --bin taskboard-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! TASKBOARD_ADDR=127.0.0.1:8080 cargo run --bin taskboard-server
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use taskboard_server::config::{ServerCliArgs, ServerConfig};
use taskboard_server::server::{self, AppState};
use taskboard_server::store::DocumentStore;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Held until exit so buffered log lines are flushed.
    let _guard = init_tracing(&config.log_level, config.log_file.as_deref());

    tracing::info!(addr = %config.bind_addr, "starting taskboard server");

    let store = DocumentStore::with_max_documents(config.max_documents);
    let state = Arc::new(AppState::with_config(
        store,
        config.task_default_limit,
        config.max_body_size,
    ));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "taskboard server listening");
            tokio::select! {
                result = handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start taskboard server");
            std::process::exit(1);
        }
    }
}

/// Installs the global subscriber, writing to `log_file` when given and to
/// stderr otherwise. `RUST_LOG` takes precedence over `level`.
fn init_tracing(level: &str, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some(path) = log_file else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("taskboard.log"));
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();
    Some(guard)
}
