//! Collection schema steps.
//!
//! # Invariants
//! - Steps are listed in ascending version order.
//! - `PRAGMA user_version` always names the last applied step.
//! - Every pending step commits together or not at all.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// `(version, sql)` pairs, oldest first.
const SCHEMA_STEPS: &[(u32, &str)] = &[(1, include_str!("0001_init.sql"))];

/// Returns the newest collection schema this build can read.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |(version, _)| *version)
}

/// Upgrades the collection behind `conn` to [`latest_version`].
///
/// # Errors
/// - [`DbError::CollectionTooNew`] when the stored schema is ahead of this build.
pub fn migrate_collection(conn: &mut Connection) -> DbResult<()> {
    let found: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::CollectionTooNew { found, supported });
    }

    let pending: Vec<_> = SCHEMA_STEPS
        .iter()
        .filter(|(version, _)| *version > found)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in &pending {
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", *version)?;
    }
    tx.commit()?;

    info!(
        "event=schema_upgrade module=db status=ok from={found} to={supported} steps={}",
        pending.len()
    );
    Ok(())
}
