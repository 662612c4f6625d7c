//! Member/team store bootstrap.
//!
//! # Responsibility
//! - Turn a `StoreConfig` (or a bare path) into a migrated connection.
//! - Report which store failed to open and why.
//!
//! # Invariants
//! - A connection handed out by this module is migrated to
//!   `migrations::latest_version()` and enforces foreign keys.
//! - A store written by a newer build is never downgraded or touched.

use crate::config::ConfigError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with_config};

pub type DbResult<T> = Result<T, DbError>;

/// Store bootstrap failure.
#[derive(Debug)]
pub enum DbError {
    /// The store file (or in-memory store) could not be opened.
    Open {
        target: String,
        source: rusqlite::Error,
    },
    /// Statement failure after the store was opened.
    Sqlite(rusqlite::Error),
    /// The store's schema version is ahead of this build.
    SchemaTooNew { found: u32, supported: u32 },
    /// The store config was rejected before opening.
    Config(ConfigError),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { target, source } => {
                write!(f, "cannot open member store `{target}`: {source}")
            }
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "member store schema version {found} was written by a newer build (supported up to {supported})"
            ),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::Sqlite(err) => Some(err),
            Self::SchemaTooNew { .. } => None,
            Self::Config(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<ConfigError> for DbError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
