//! Unit-of-work orchestration over the repositories.
//!
//! # Responsibility
//! - Scope a group of repository calls to one SQLite transaction.
//! - Keep an identity map of the members managed by that transaction.
//!
//! # Invariants
//! - Writes become visible to other connections only after `commit`.
//! - Dropping a unit of work without committing rolls it back.
//! - Bulk updates bypass the identity map; callers `clear` or `refresh`.

pub mod unit_of_work;
