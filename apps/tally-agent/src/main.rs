//! # Tally Agent
//!
//! Runs the sync engine without a UI: opens the local store, schedules
//! push/pull cycles and logs every sync event until Ctrl-C.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Logging        RUST_LOG, default info + debug for tally crates      │
//! │  2. Config         sync.toml from the platform config dir + TALLY_*     │
//! │  3. Database       TALLY_DB_PATH or <data dir>/tally.db, migrations     │
//! │  4. Engine         device identity loaded or generated                  │
//! │  5. Scheduler      push 30s · pull 120s · startup kick                  │
//! │  6. Probe          GET /health drives online/offline                    │
//! │  7. Ctrl-C         stop probe, stop scheduler, close database           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod probe;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tally_core::{SyncEvent, SyncEventKind};
use tally_db::{Database, DbConfig};
use tally_sync::{
    ConnectivityMonitor, HttpTransport, SyncConfig, SyncEngine, SyncScheduler, SyncTransport,
};

use crate::probe::ConnectivityProbe;

/// How often the agent re-checks server reachability.
const PROBE_PERIOD: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Tally sync agent");

    let config = SyncConfig::load_or_default(None);
    info!(
        server = %config.server_url(),
        business_id = %config.business_id(),
        "Configuration loaded"
    );

    let db_path = database_path()?;
    info!(?db_path, "Database path determined");
    let db = Arc::new(Database::new(DbConfig::new(db_path)).await?);
    info!("Database connected and migrations applied");

    let transport: Arc<dyn SyncTransport> = Arc::new(HttpTransport::from_config(&config)?);
    let initially_online = transport.health().await.is_ok();
    let connectivity = Arc::new(ConnectivityMonitor::new(initially_online));

    let engine = SyncEngine::builder(config)
        .with_store(db.clone())
        .with_transport(transport.clone())
        .with_connectivity(connectivity.clone())
        .build()
        .await?;

    let events = engine.events().add_listener(log_event);

    let stats = engine.stats().await?;
    info!(
        device_id = %stats.device_id,
        pending = stats.pending,
        last_sync = stats.last_sync,
        online = stats.is_online,
        "Sync engine initialised"
    );

    let scheduler = SyncScheduler::new(engine.clone()).start();

    let (probe, probe_handle) = ConnectivityProbe::new(transport, connectivity, PROBE_PERIOD);
    let probe_task = tokio::spawn(probe.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    probe_handle.shutdown().await;
    if let Err(e) = probe_task.await {
        error!(?e, "Connectivity probe task failed");
    }

    scheduler.stop().await;
    events.unsubscribe();
    db.close().await;

    info!("Tally sync agent stopped");
    Ok(())
}

/// Logs sync events the way a UI would surface them.
fn log_event(event: &SyncEvent) {
    match event.kind {
        SyncEventKind::SyncSuccess => info!(
            direction = %event.direction,
            count = event.count.unwrap_or(0),
            "Synced"
        ),
        SyncEventKind::SyncError => warn!(
            direction = %event.direction,
            error = event.error.as_deref().unwrap_or("unknown"),
            retryable = event.retryable,
            "Sync failed, will retry"
        ),
    }
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Everything at debug
/// - `RUST_LOG=tally_sync=trace` - Trace for the sync engine only
/// - Default: INFO, DEBUG for tally crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,tally_sync=debug,tally_db=debug,tally_agent=debug,sqlx=warn")
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves the SQLite file location.
///
/// ## Platform-Specific Paths
/// - **macOS**: `~/Library/Application Support/com.tally.tally/tally.db`
/// - **Windows**: `%APPDATA%\tally\tally\data\tally.db`
/// - **Linux**: `~/.local/share/tally/tally.db`
///
/// `TALLY_DB_PATH` overrides the location.
fn database_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(path) = std::env::var("TALLY_DB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let dirs = ProjectDirs::from("com", "tally", "tally")
        .ok_or("Could not determine app data directory")?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;

    Ok(data_dir.join("tally.db"))
}
