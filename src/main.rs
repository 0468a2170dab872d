//! CultureHub Server
//!
//! REST backend for the CultureHub social cataloging app.
//!
//! # Architecture
//!
//! - **API Server**: accounts, profiles, lists, posts, follows, feed
//! - **Storage**: PostgreSQL via sqlx, or an in-memory backend
//! - **Content search**: TMDB, Google Books, Deezer and Jikan proxies
//! - **Session sweeper**: drops expired bearer tokens
//!
//! # Graceful Shutdown
//!
//! SIGTERM and SIGINT stop accepting connections, let in-flight requests
//! finish and close the database pool.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use culturehub::auth::{spawn_session_sweeper, PasswordCrypto, SessionStore};
use culturehub::config::{Config, StorageBackend};
use culturehub::database::{self, Database};
use culturehub::providers::SearchProviders;
use culturehub::{api, AppState, MemoryStorage, PgStorage, Storage};

/// Connection attempts before startup gives up on the database
const DB_CONNECT_ATTEMPTS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so LOG_DIR is known; config errors go to stderr
    let config = Arc::new(Config::from_env()?);
    let _log_guard = init_tracing(&config);

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🚀 CultureHub Server v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");
    info!("  Components:");
    info!("    • REST API Server");
    info!("    • Storage backend ({:?})", config.storage);
    info!("    • Session sweeper");
    info!("═══════════════════════════════════════════════════════════════");
    config.log_summary();
    info!("✅ Configuration loaded and validated");

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let (storage, db) = init_storage(&config).await?;

    let sessions = SessionStore::new(config.auth.session_ttl);
    let passwords = PasswordCrypto::new(config.auth.password_min_length)?;
    let providers = SearchProviders::new(config.providers.clone())?;
    info!("✅ Auth and content providers initialized");

    let state = Arc::new(AppState {
        storage,
        sessions: sessions.clone(),
        passwords,
        providers,
    });

    let mut handles = Vec::new();

    info!("🧹 Starting session sweeper...");
    handles.push(spawn_session_sweeper(
        sessions,
        config.auth.session_sweep_interval,
        shutdown_tx.subscribe(),
    ));

    info!("🌐 Starting API server on port {}...", config.api.port);
    handles.push(spawn_api_server(
        state.clone(),
        config.clone(),
        shutdown_tx.subscribe(),
    ));

    info!("═══════════════════════════════════════════════════════════════");
    info!("  ✅ All services started successfully");
    info!("  📡 API: http://{}:{}", config.api.host, config.api.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );
    info!("═══════════════════════════════════════════════════════════════");

    // Wait for shutdown signal or service failure
    tokio::select! {
        _ = shutdown_signal() => {
            info!("📴 Shutdown signal received");
        }
        _ = wait_for_any_failure(&mut handles) => {
            warn!("⚠️ A service stopped unexpectedly, initiating shutdown");
        }
    }

    info!("🛑 Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    let shutdown_timeout = Duration::from_secs(30);
    if tokio::time::timeout(shutdown_timeout, shutdown_services(handles))
        .await
        .is_err()
    {
        warn!("⚠️ Shutdown timeout exceeded, forcing exit");
    }

    if let Some(db) = db {
        db.close().await;
    }

    info!("👋 CultureHub Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing. When `LOG_DIR` is set a JSON
/// copy of every event goes to a daily-rolling file; keep the returned guard
/// alive so buffered lines are flushed on exit.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "culturehub=debug,culturehub_server=debug,tower_http=debug,sqlx=warn,info",
        )
    });

    let stdout = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(std::env::var("NO_COLOR").is_err());

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "culturehub.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file_layer)
        .init();

    guard
}

/// Build the configured storage backend. PostgreSQL gets migrated first.
async fn init_storage(
    config: &Config,
) -> anyhow::Result<(Arc<dyn Storage>, Option<Database>)> {
    match config.storage {
        StorageBackend::Postgres => {
            let db =
                Database::connect_with_retry(&config.database, DB_CONNECT_ATTEMPTS).await?;
            info!("✅ Database connection pool established");

            info!("📦 Running database migrations...");
            database::run_migrations(db.pool()).await?;
            info!("✅ Database migrations applied");

            let stats = db.stats();
            info!("  Pool: {} connections ({} idle)", stats.size, stats.idle);

            let storage: Arc<dyn Storage> = Arc::new(PgStorage::new(db.clone()));
            Ok((storage, Some(db)))
        }
        StorageBackend::Memory => {
            warn!("⚠️ Using in-memory storage, data is lost on restart");
            let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
            Ok((storage, None))
        }
    }
}

/// Spawn the API server
fn spawn_api_server(
    state: Arc<AppState>,
    config: Arc<Config>,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = api::start_server(state, &config.api, shutdown_rx).await {
            error!("API server error: {:?}", e);
        }
        info!("API server stopped");
    })
}

/// Wait for any task to finish; before shutdown that means it failed
async fn wait_for_any_failure(handles: &mut [JoinHandle<()>]) {
    loop {
        if handles.iter().any(|handle| handle.is_finished()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for all services to complete shutdown
async fn shutdown_services(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
