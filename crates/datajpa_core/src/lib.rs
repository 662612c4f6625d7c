//! Member/team data-access core.
//! Entities, query descriptors, SQLite-backed repositories and a
//! transaction-scoped unit of work.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod session;

pub use config::{ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::entity::{Entity, ReadOnly, Relation, SessionId};
pub use model::member::{Member, MemberDto, MemberId};
pub use model::page::{Page, PageRequest, Slice};
pub use model::team::{Team, TeamId, TeamMember};
pub use query::{Direction, FetchPlan, LockMode, MemberFilter, MemberQuery, Order, SortField};
pub use repo::member_repo::{MemberRepository, RepoError, RepoResult, SqliteMemberRepository};
pub use repo::team_repo::{SqliteTeamRepository, TeamRepository};
pub use session::unit_of_work::UnitOfWork;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
