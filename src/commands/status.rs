use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StoreArgs;
use crate::metadata::CalcStatus;
use crate::store::{count_rows, metadata_value};

pub fn run(store: &StoreArgs) -> Result<()> {
    let db_path = store.resolved_db_path();
    info!(cache_root = %store.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let connection = Connection::open(&db_path)?;
    let value = |key: &str| {
        metadata_value(&connection, key)
            .ok()
            .flatten()
            .unwrap_or_default()
    };

    info!(
        path = %db_path.display(),
        schema_version = %value("db_schema_version"),
        application = %value("application"),
        seed_sha256 = %value("seed_sha256"),
        loaded_at = %value("metadata_loaded_at"),
        "store metadata"
    );

    let count = |sql: &str| count_rows(&connection, sql).unwrap_or(0);
    let needs_consolidation = format!(
        "SELECT COUNT(*) FROM calc_status WHERE flags & {} != 0",
        CalcStatus::NEEDS_CONSOLIDATION.bits()
    );
    info!(
        dimensions = count("SELECT COUNT(*) FROM dimensions"),
        members = count("SELECT COUNT(*) FROM members"),
        member_lists = count("SELECT COUNT(*) FROM member_lists WHERE kind = 'stored'"),
        calc_status_rows = count("SELECT COUNT(*) FROM calc_status"),
        needs_consolidation = count(&needs_consolidation),
        journal_entries = count("SELECT COUNT(*) FROM journal"),
        runs = count("SELECT COUNT(DISTINCT run_id) FROM journal"),
        "store counts"
    );

    Ok(())
}
