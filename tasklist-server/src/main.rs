//! `Tasklist` API server.
//!
//! Serves the task list JSON API over a SQLite database, with attachments
//! in a local blob directory.
//!
//! ```bash
//! # Defaults: 127.0.0.1:8080, ./tasklist.db, ./blobs
//! cargo run --bin tasklist-server
//!
//! # Custom address and database
//! cargo run --bin tasklist-server -- --bind 0.0.0.0:3000 \
//!     --database-url sqlite:///var/lib/tasklist/tasks.db
//!
//! # Or via environment variables
//! TASKLIST_ADDR=0.0.0.0:3000 DATABASE_URL=sqlite://tasks.db cargo run --bin tasklist-server
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tasklist::{BlobLocator, ChangeNotifier, Database, FsBlobStore, TaskRepository};
use tasklist_server::api::{self, AppState};
use tasklist_server::config::{CliArgs, ServerConfig};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    tracing::info!(
        addr = %config.bind_addr,
        database = %config.database_url,
        "starting tasklist server"
    );

    let db = match Database::connect(&config.database_url, config.max_connections).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "failed to open database");
            std::process::exit(1);
        }
    };

    let blobs = FsBlobStore::new(config.blob_root.clone());
    tracing::info!(root = %blobs.root().display(), bucket = %config.bucket, "blob store ready");
    let repo = TaskRepository::new(&db, blobs)
        .with_locator(BlobLocator::new(config.bucket.clone()))
        .with_max_batch_items(config.max_batch_items);
    let state = Arc::new(AppState::new(Arc::new(repo), ChangeNotifier::new()));

    match api::start_server_with_state(&config.bind_addr, state, shutdown_signal()).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "tasklist server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            db.close().await;
            std::process::exit(1);
        }
    }

    db.close().await;
    tracing::info!("tasklist server stopped");
}

/// Resolves on Ctrl-C. If the handler cannot be installed the server runs
/// until killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, draining requests");
}

/// Initialize logging to stderr, or to `file_path` through a non-blocking
/// writer.
///
/// Returns a [`WorkerGuard`] when logging to a file; it must be held until
/// shutdown so buffered entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((log_dir, file_name)) = file_path.and_then(|path| {
        let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
        Some((dir.unwrap_or_else(|| Path::new(".")), path.file_name()?))
    }) else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
