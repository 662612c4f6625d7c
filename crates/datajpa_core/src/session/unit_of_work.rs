//! Transaction-scoped persistence context.
//!
//! # Responsibility
//! - Own the transaction for one logical unit of work.
//! - Track managed members so repeated reads of a row return the in-memory
//!   state, including changes saved earlier in the same unit of work.
//! - Bind lazy team relations to this unit of work.
//!
//! # Invariants
//! - A row already managed is returned from the identity map, not from the
//!   freshly read columns. Bulk updates therefore stay invisible until
//!   `clear`, `detach` or `refresh`.
//! - Locked reads always overwrite the identity map with the locked rows.
//! - Locked reads are only issued from `begin_for_update` units of work. A
//!   deferred transaction that has already read cannot wait for the write
//!   lock (SQLite reports busy at once), so it is refused up front.
//! - Read-only lookups never enter the identity map.

use crate::model::entity::{Entity, ReadOnly, SessionId};
use crate::model::member::{Member, MemberId};
use crate::model::team::{Team, TeamId};
use crate::query::MemberQuery;
use crate::repo::ensure_connection_ready;
use crate::repo::member_repo::{MemberRepository, RepoError, RepoResult, SqliteMemberRepository};
use crate::repo::team_repo::{SqliteTeamRepository, TeamRepository};
use log::{debug, error, info};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

/// One transaction plus the identity map of the members it manages.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
    session: SessionId,
    for_update: bool,
    started_at: Instant,
    managed: HashMap<MemberId, Member>,
}

impl<'conn> UnitOfWork<'conn> {
    /// Starts a deferred transaction: locks are taken on first read/write.
    pub fn begin(conn: &'conn Connection) -> RepoResult<Self> {
        Self::start(conn, TransactionBehavior::Deferred)
    }

    /// Starts an immediate transaction: the store's write lock is taken up
    /// front, waiting up to the connection's busy timeout. Required for
    /// locked lookups.
    pub fn begin_for_update(conn: &'conn Connection) -> RepoResult<Self> {
        Self::start(conn, TransactionBehavior::Immediate)
    }

    fn start(conn: &'conn Connection, behavior: TransactionBehavior) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;

        let for_update = matches!(behavior, TransactionBehavior::Immediate);
        let mode = if for_update { "immediate" } else { "deferred" };

        let started_at = Instant::now();
        let tx = match Transaction::new_unchecked(conn, behavior) {
            Ok(tx) => tx,
            Err(err) => {
                error!(
                    "event=uow_begin module=session status=error mode={mode} wait_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(match err.sqlite_error_code() {
                    Some(ErrorCode::DatabaseBusy) => RepoError::LockConflict {
                        entity: Member::NAME,
                        waited_ms: started_at.elapsed().as_millis(),
                    },
                    _ => err.into(),
                });
            }
        };

        let session = SessionId::new();
        debug!(
            "event=uow_begin module=session status=ok mode={mode} session={session} wait_ms={}",
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            tx,
            session,
            for_update,
            started_at: Instant::now(),
            managed: HashMap::new(),
        })
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Whether this unit of work holds the store's write lock from the start.
    pub fn is_for_update(&self) -> bool {
        self.for_update
    }

    /// Direct member gateway inside this transaction. Its reads bypass the
    /// identity map.
    pub fn members(&self) -> SqliteMemberRepository<'_> {
        SqliteMemberRepository::attached(&self.tx, self.session)
    }

    pub fn teams(&self) -> SqliteTeamRepository<'_> {
        SqliteTeamRepository::attached(&self.tx, self.session)
    }

    pub fn save_team(&self, team: &mut Team) -> RepoResult<TeamId> {
        self.teams().save(team)
    }

    /// Writes the member and makes its saved state the managed state.
    pub fn save_member(&mut self, member: &mut Member) -> RepoResult<MemberId> {
        let id = self.members().save(member)?;
        self.managed.insert(id, member.clone());
        Ok(id)
    }

    pub fn find_member(&mut self, id: MemberId) -> RepoResult<Option<Member>> {
        if let Some(member) = self.managed.get(&id) {
            return Ok(Some(member.clone()));
        }
        let found = self.members().find_by_id(id)?;
        Ok(found.map(|member| self.manage(member)))
    }

    /// Runs the descriptor and resolves every row through the identity map.
    pub fn find_members(&mut self, query: &MemberQuery) -> RepoResult<Vec<Member>> {
        let rows = self.members().find(query)?;
        Ok(rows.into_iter().map(|member| self.manage(member)).collect())
    }

    pub fn find_all_members(&mut self) -> RepoResult<Vec<Member>> {
        self.find_members(&MemberQuery::new())
    }

    /// Single-result lookup by username; more than one match is an error.
    pub fn find_member_by_username(&mut self, username: &str) -> RepoResult<Option<Member>> {
        let mut members = self.find_members(&MemberQuery::new().username_eq(username))?;
        match members.len() {
            0 | 1 => Ok(members.pop()),
            found => Err(RepoError::NonUniqueResult {
                entity: Member::NAME,
                found,
            }),
        }
    }

    /// Lookup whose result is never tracked by this unit of work.
    pub fn find_read_only_by_username(
        &self,
        username: &str,
    ) -> RepoResult<Option<ReadOnly<Member>>> {
        self.members().find_read_only_by_username(username)
    }

    /// Takes the write lock on the matched rows, then reads them. The read
    /// state replaces whatever the identity map held for those rows.
    ///
    /// Fails with `LockRequiresWriteTransaction` unless the unit of work was
    /// started with `begin_for_update`.
    pub fn find_lock_by_username(&mut self, username: &str) -> RepoResult<Vec<Member>> {
        if !self.for_update {
            debug!(
                "event=member_lock module=session status=rejected session={} reason=deferred_transaction",
                self.session
            );
            return Err(RepoError::LockRequiresWriteTransaction);
        }
        let locked = self.members().find_lock_by_username(username)?;
        for member in &locked {
            if let Some(id) = member.id {
                self.managed.insert(id, member.clone());
            }
        }
        Ok(locked)
    }

    pub fn delete_member(&mut self, member: &Member) -> RepoResult<()> {
        self.members().delete(member)?;
        if let Some(id) = member.id {
            self.managed.remove(&id);
        }
        Ok(())
    }

    /// Storage-side `age + 1`. Managed members keep their old age.
    pub fn bulk_age_plus(&self, age_threshold: i32) -> RepoResult<usize> {
        self.members().bulk_age_plus(age_threshold)
    }

    /// Storage-side `age + delta`. Managed members keep their old age.
    pub fn bulk_age_add(&self, age_threshold: i32, delta: i32) -> RepoResult<usize> {
        self.members().bulk_age_add(age_threshold, delta)
    }

    /// Loads the member's team. Lazy relations from another session fail
    /// with `DetachedRelation`.
    pub fn load_team(&self, member: &Member) -> RepoResult<Option<Team>> {
        self.members().load_team(member)
    }

    /// Re-reads one member from storage into both the identity map and
    /// `member`. Returns `false` when the row no longer exists.
    pub fn refresh(&mut self, member: &mut Member) -> RepoResult<bool> {
        let Some(id) = member.id else {
            return Ok(false);
        };
        match self.members().find_by_id(id)? {
            Some(fresh) => {
                self.managed.insert(id, fresh.clone());
                *member = fresh;
                Ok(true)
            }
            None => {
                self.managed.remove(&id);
                Ok(false)
            }
        }
    }

    /// Forgets one managed member.
    pub fn detach(&mut self, id: MemberId) -> bool {
        self.managed.remove(&id).is_some()
    }

    /// Forgets every managed member; later reads see current storage state.
    pub fn clear(&mut self) {
        debug!(
            "event=uow_clear module=session status=ok session={} evicted={}",
            self.session,
            self.managed.len()
        );
        self.managed.clear();
    }

    pub fn is_managed(&self, id: MemberId) -> bool {
        self.managed.contains_key(&id)
    }

    pub fn managed_count(&self) -> usize {
        self.managed.len()
    }

    pub fn commit(self) -> RepoResult<()> {
        let Self {
            tx,
            session,
            started_at,
            ..
        } = self;
        match tx.commit() {
            Ok(()) => {
                info!(
                    "event=uow_commit module=session status=ok session={session} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=uow_commit module=session status=error session={session} duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    pub fn rollback(self) -> RepoResult<()> {
        let Self {
            tx,
            session,
            started_at,
            ..
        } = self;
        tx.rollback()?;
        info!(
            "event=uow_rollback module=session status=ok session={session} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn manage(&mut self, member: Member) -> Member {
        let Some(id) = member.id else {
            return member;
        };
        match self.managed.entry(id) {
            Entry::Occupied(mut entry) => {
                let cached = entry.get_mut();
                let upgrades_team = member.team.as_ref().is_some_and(|team| team.is_loaded())
                    && !cached.team.as_ref().is_some_and(|team| team.is_loaded())
                    && cached.team_id() == member.team_id();
                if upgrades_team {
                    cached.team = member.team;
                }
                cached.clone()
            }
            Entry::Vacant(entry) => entry.insert(member).clone(),
        }
    }
}
