// Care Ledger - Web Server
// REST API with Axum over the shared SQLite ledger

use anyhow::{Context, Result};
use rusqlite::Connection;

use care_ledger::api::{router, AppState};
use care_ledger::{init_tracing, setup_database, AppConfig, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("care_ledger=info,care_ledger_server=info,tower_http=info");

    let config = AppConfig::from_env()?;
    tracing::info!(version = VERSION, "care-ledger server starting");

    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {:?}", config.db_path))?;
    setup_database(&conn)?;
    tracing::info!(db = ?config.db_path, "database ready");
    tracing::info!(
        max_surgery_records = config.limits.max_surgery_records,
        max_entries_per_record = config.limits.max_entries_per_record,
        max_hospitals = config.limits.max_hospitals,
        "free plan limits"
    );

    let app = router(AppState::new(conn, config.limits));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "server running, API under /api");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
