//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the member/team data access contracts.
//! - Isolate SQLite query details from unit-of-work orchestration.
//!
//! # Invariants
//! - Lookups signal absence with `Ok(None)`, never with an error.
//! - Storage constraint failures surface as `RepoError::ConstraintViolation`.
//! - Repositories only run on connections migrated to the latest version.

pub mod member_repo;
pub mod team_repo;

use crate::db::migrations::{current_user_version, latest_version};
use member_repo::{RepoError, RepoResult};
use rusqlite::Connection;

const REQUIRED_TABLES: [&str; 2] = ["team", "member"];

pub(crate) fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

/// Converts a `COUNT(*)` result, rejecting values SQLite should never yield.
pub(crate) fn row_count(count: i64, entity: &'static str) -> RepoResult<u64> {
    u64::try_from(count)
        .map_err(|_| RepoError::InvalidData(format!("negative {entity} count `{count}`")))
}

#[cfg(test)]
mod tests {
    use super::row_count;
    use crate::repo::member_repo::RepoError;

    #[test]
    fn row_count_passes_non_negative_values() {
        assert_eq!(row_count(0, "team").unwrap(), 0);
        assert_eq!(row_count(42, "member").unwrap(), 42);
    }

    #[test]
    fn negative_row_count_is_invalid_data() {
        let err = row_count(-1, "team").unwrap_err();
        match err {
            RepoError::InvalidData(message) => assert!(message.contains("team")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
