//! Identity, relationship and read-only wrappers shared by entities.
//!
//! # Invariants
//! - A `Relation::Unloaded` value is only resolvable inside the session that
//!   produced it.
//! - Relation equality is identity equality: loaded and unloaded handles to
//!   the same row compare equal.

use std::fmt::{Display, Formatter};
use std::ops::Deref;
use uuid::Uuid;

/// Identifier of one data-access session (a repository handle or a unit of
/// work). Lazy relations remember the session they were loaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted record with a storage-assigned identity.
pub trait Entity {
    /// Table-level name used in diagnostics.
    const NAME: &'static str;

    /// Storage identity, `None` while the entity is transient.
    fn id(&self) -> Option<i64>;

    fn is_transient(&self) -> bool {
        self.id().is_none()
    }
}

/// Many-to-one reference that is either a bare foreign key or the loaded
/// target.
#[derive(Debug, Clone)]
pub enum Relation<T> {
    /// Only the foreign key is known; load through the owning session.
    Unloaded { id: i64, session: SessionId },
    /// Target row was fetched together with the owner.
    Loaded(T),
}

impl<T: Entity> Relation<T> {
    /// Referenced identity, `None` when the loaded target is still transient.
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Unloaded { id, .. } => Some(*id),
            Self::Loaded(target) => target.id(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Returns the target when it is already in memory.
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Unloaded { .. } => None,
            Self::Loaded(target) => Some(target),
        }
    }
}

impl<T: Entity> PartialEq for Relation<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

/// Entity returned by a read-only lookup.
///
/// The wrapped value is never registered in a unit of work, so it cannot be
/// written back by accident; clone it out explicitly to save changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOnly<T>(T);

impl<T> ReadOnly<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> Deref for ReadOnly<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{Entity, ReadOnly, Relation, SessionId};

    #[derive(Debug, Clone)]
    struct Stub(Option<i64>);

    impl Entity for Stub {
        const NAME: &'static str = "stub";

        fn id(&self) -> Option<i64> {
            self.0
        }
    }

    #[test]
    fn relation_equality_ignores_load_state() {
        let unloaded = Relation::<Stub>::Unloaded {
            id: 7,
            session: SessionId::new(),
        };
        let loaded = Relation::Loaded(Stub(Some(7)));
        assert_eq!(unloaded, loaded);
        assert_ne!(loaded, Relation::Loaded(Stub(Some(8))));
    }

    #[test]
    fn unloaded_relation_has_no_target() {
        let relation = Relation::<Stub>::Unloaded {
            id: 3,
            session: SessionId::new(),
        };
        assert!(!relation.is_loaded());
        assert!(relation.get().is_none());
        assert_eq!(relation.id(), Some(3));
    }

    #[test]
    fn read_only_derefs_to_inner_value() {
        let wrapped = ReadOnly::new(Stub(Some(1)));
        assert_eq!(wrapped.id(), Some(1));
        assert!(!wrapped.is_transient());
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
