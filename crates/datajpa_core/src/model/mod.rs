//! Domain model for members, teams and paged query results.
//!
//! # Responsibility
//! - Define the records persisted by the repositories.
//! - Define the relationship and read-only wrappers handed out by queries.
//!
//! # Invariants
//! - Storage assigns identifiers; callers never invent them.
//! - `Member.team` and `Team.members` are kept consistent by
//!   `Member::change_team`.

pub mod entity;
pub mod member;
pub mod page;
pub mod team;
