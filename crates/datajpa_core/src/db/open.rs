//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by repository behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have a non-zero busy timeout, so competing
//!   writers wait for a held lock instead of failing immediately.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use crate::config::StoreConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const MEMORY_TARGET: &str = ":memory:";

/// Opens a SQLite database file with default tuning and applies migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let busy_timeout = StoreConfig::default().busy_timeout();
    let target = path.as_ref().display().to_string();
    open_logged(&target, busy_timeout, move || Connection::open(path))
}

/// Opens a private in-memory SQLite database and applies migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let busy_timeout = StoreConfig::default().busy_timeout();
    open_logged(MEMORY_TARGET, busy_timeout, Connection::open_in_memory)
}

/// Validates `config`, then opens the database it describes.
pub fn open_db_with_config(config: &StoreConfig) -> DbResult<Connection> {
    config.validate()?;
    match &config.database_path {
        Some(path) => {
            let target = path.display().to_string();
            open_logged(&target, config.busy_timeout(), || Connection::open(path))
        }
        None => open_logged(
            MEMORY_TARGET,
            config.busy_timeout(),
            Connection::open_in_memory,
        ),
    }
}

fn open_logged<F>(target: &str, busy_timeout: Duration, open: F) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    let mode = if target == MEMORY_TARGET { "memory" } else { "file" };
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(DbError::Open {
                target: target.to_string(),
                source: err,
            });
        }
    };

    match bootstrap_connection(&mut conn, busy_timeout) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    apply_migrations(conn)?;
    Ok(())
}
