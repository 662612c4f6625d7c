//! Member repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, filtered, paged and bulk APIs over `member` storage.
//! - Resolve lazy team relations inside the session that loaded them.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - `save` inserts when the member has no id and upserts on its id otherwise.
//! - Single-result lookups fail with `NonUniqueResult` on multiple matches.
//! - `delete` of an absent or transient member is a no-op.
//! - Bulk updates write straight to storage; loaded `Member` values are not
//!   touched.

use crate::db::DbError;
use crate::model::entity::{Entity, ReadOnly, Relation, SessionId};
use crate::model::member::{Member, MemberDto, MemberId};
use crate::model::page::{Page, PageRequest, Slice};
use crate::model::team::{Team, TeamId};
use crate::query::{FetchPlan, LockMode, MemberQuery, Order, SortField};
use crate::repo::{ensure_connection_ready, row_count};
use crate::repo::team_repo::{SqliteTeamRepository, TeamRepository};
use log::{debug, error, info, warn};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for member/team persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// A single-result lookup matched more than one row.
    NonUniqueResult { entity: &'static str, found: usize },
    /// Storage rejected the write (foreign key, NOT NULL, UNIQUE).
    ConstraintViolation(String),
    /// The entity references another entity that has never been saved.
    TransientReference {
        entity: &'static str,
        target: &'static str,
    },
    /// A lazy relation was resolved outside the session that loaded it.
    DetachedRelation { target: &'static str, id: i64 },
    /// The write lock is held elsewhere and storage refused to wait for it
    /// (the caller's transaction already holds a read lock) or the busy
    /// timeout ran out.
    LockConflict { entity: &'static str, waited_ms: u128 },
    /// A locked lookup was issued on a unit of work that was not started
    /// with `UnitOfWork::begin_for_update`.
    LockRequiresWriteTransaction,
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid entity.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NonUniqueResult { entity, found } => write!(
                f,
                "expected at most one {entity} but the query matched {found}"
            ),
            Self::ConstraintViolation(message) => {
                write!(f, "storage constraint violated: {message}")
            }
            Self::TransientReference { entity, target } => write!(
                f,
                "{entity} references an unsaved {target}; save the {target} first"
            ),
            Self::DetachedRelation { target, id } => write!(
                f,
                "{target} {id} cannot be loaded: the session that produced the reference is closed"
            ),
            Self::LockConflict { entity, waited_ms } => write!(
                f,
                "{entity} write lock is held by another transaction (gave up after {waited_ms} ms)"
            ),
            Self::LockRequiresWriteTransaction => write!(
                f,
                "locked lookups need a unit of work started with begin_for_update"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(message.unwrap_or_else(|| failure.to_string()))
            }
            other => Self::Db(DbError::Sqlite(other)),
        }
    }
}

/// Data access contract for members.
///
/// Implementors provide statement execution; the named finders are built
/// from `MemberQuery` descriptors on top of it.
pub trait MemberRepository {
    /// Inserts a transient member or upserts a persisted one. Populates
    /// `member.id` on insert.
    fn save(&self, member: &mut Member) -> RepoResult<MemberId>;
    /// Removes the row with the member's id. Absent rows are ignored.
    fn delete(&self, member: &Member) -> RepoResult<()>;
    /// Executes a query descriptor.
    fn find(&self, query: &MemberQuery) -> RepoResult<Vec<Member>>;
    /// Counts rows matching the descriptor's filters.
    fn count_matching(&self, query: &MemberQuery) -> RepoResult<u64>;
    /// Adds `delta` to `age` for every row with `age >= age_threshold`.
    /// A result outside the `i32` range aborts the whole update with
    /// `ConstraintViolation`.
    fn bulk_age_add(&self, age_threshold: i32, delta: i32) -> RepoResult<usize>;
    /// Username projection in storage order.
    fn find_usernames(&self) -> RepoResult<Vec<String>>;
    /// Members inner-joined with their team name.
    fn find_member_dtos(&self) -> RepoResult<Vec<MemberDto>>;
    /// Returns the member's team, loading it when the relation is lazy.
    fn load_team(&self, member: &Member) -> RepoResult<Option<Team>>;

    fn find_by_id(&self, id: MemberId) -> RepoResult<Option<Member>> {
        self.find_single(&MemberQuery::new().id_eq(id))
    }

    fn find_all(&self) -> RepoResult<Vec<Member>> {
        self.find(&MemberQuery::new())
    }

    fn count(&self) -> RepoResult<u64> {
        self.count_matching(&MemberQuery::new())
    }

    /// Zero matches give `Ok(None)`, more than one is `NonUniqueResult`.
    fn find_single(&self, query: &MemberQuery) -> RepoResult<Option<Member>> {
        let mut members = self.find(query)?;
        match members.len() {
            0 | 1 => Ok(members.pop()),
            found => Err(RepoError::NonUniqueResult {
                entity: Member::NAME,
                found,
            }),
        }
    }

    fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: i32,
    ) -> RepoResult<Vec<Member>> {
        self.find(&MemberQuery::new().username_eq(username).age_gt(age))
    }

    /// Members with `age`, ordered by username descending, windowed.
    fn find_by_page(&self, age: i32, offset: u64, limit: u64) -> RepoResult<Vec<Member>> {
        self.find(
            &MemberQuery::new()
                .age_eq(age)
                .order_by(Order::desc(SortField::Username))
                .offset(offset)
                .limit(limit),
        )
    }

    /// Number of members with `age`, for computing page counts.
    fn total_count(&self, age: i32) -> RepoResult<u64> {
        self.count_matching(&MemberQuery::new().age_eq(age))
    }

    /// Adds one year to every member aged `age_threshold` or older.
    fn bulk_age_plus(&self, age_threshold: i32) -> RepoResult<usize> {
        self.bulk_age_add(age_threshold, 1)
    }

    fn find_top3(&self) -> RepoResult<Vec<Member>> {
        self.find(&MemberQuery::new().limit(3))
    }

    fn find_user(&self, username: &str, age: i32) -> RepoResult<Vec<Member>> {
        self.find(&MemberQuery::new().username_eq(username).age_eq(age))
    }

    fn find_by_names(&self, names: &[String]) -> RepoResult<Vec<Member>> {
        self.find(&MemberQuery::new().username_in(names.iter().cloned()))
    }

    fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.find(&MemberQuery::new().username_eq(username))
    }

    fn find_member_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        self.find_single(&MemberQuery::new().username_eq(username))
    }

    /// Page of members with `age`. Content rows join the team; the total is
    /// counted over the member table alone.
    fn find_page_by_age(&self, age: i32, request: &PageRequest) -> RepoResult<Page<Member>> {
        let predicate = MemberQuery::new().age_eq(age);
        let content = self.find(
            &predicate
                .clone()
                .fetch_team()
                .order_by_all(request.sort())
                .offset(request.offset())
                .limit(request.size()),
        )?;
        Page::from_content(content, request, || self.count_matching(&predicate))
    }

    /// Slice of members with `age`; reads one extra row instead of counting.
    fn find_slice_by_age(&self, age: i32, request: &PageRequest) -> RepoResult<Slice<Member>> {
        let content = self.find(
            &MemberQuery::new()
                .age_eq(age)
                .order_by_all(request.sort())
                .offset(request.offset())
                .limit(request.size().saturating_add(1)),
        )?;
        Ok(Slice::from_lookahead(content, request))
    }

    /// All members with their team read in the same statement.
    fn find_member_fetch_join(&self) -> RepoResult<Vec<Member>> {
        self.find(&MemberQuery::new().fetch_team())
    }

    fn find_all_with_team(&self) -> RepoResult<Vec<Member>> {
        self.find_member_fetch_join()
    }

    fn find_entity_graph_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.find(&MemberQuery::new().username_eq(username).fetch_team())
    }

    fn find_read_only_by_username(&self, username: &str) -> RepoResult<Option<ReadOnly<Member>>> {
        Ok(self.find_member_by_username(username)?.map(ReadOnly::new))
    }

    /// Members named `username`, read under the store's write lock.
    fn find_lock_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.find(&MemberQuery::new().username_eq(username).lock_for_update())
    }

    /// Replaces a lazy team relation with the loaded team.
    fn initialize_team(&self, member: &mut Member) -> RepoResult<()> {
        if member.team.as_ref().is_some_and(|team| team.is_loaded()) {
            return Ok(());
        }
        if let Some(team) = self.load_team(member)? {
            member.team = Some(Relation::Loaded(team));
        }
        Ok(())
    }
}

/// SQLite-backed member repository.
///
/// Every instance is its own session: lazy relations it hands out can only
/// be resolved through the same instance (or the unit of work that owns it).
pub struct SqliteMemberRepository<'conn> {
    conn: &'conn Connection,
    session: SessionId,
}

impl<'conn> SqliteMemberRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self::attached(conn, SessionId::new()))
    }

    pub(crate) fn attached(conn: &'conn Connection, session: SessionId) -> Self {
        Self { conn, session }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    fn acquire_write_lock(&self, query: &MemberQuery) -> RepoResult<()> {
        if self.conn.is_autocommit() {
            warn!("event=member_lock module=repo status=unscoped reason=no_open_transaction");
        }

        let started_at = Instant::now();
        let (sql, binds) = query.lock_sql();
        match self.conn.execute(&sql, params_from_iter(binds)) {
            Ok(rows) => {
                info!(
                    "event=member_lock module=repo status=ok rows={} wait_ms={}",
                    rows,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                let waited_ms = started_at.elapsed().as_millis();
                error!(
                    "event=member_lock module=repo status=error wait_ms={} error={}",
                    waited_ms, err
                );
                if err.sqlite_error_code() == Some(ErrorCode::DatabaseBusy) {
                    return Err(RepoError::LockConflict {
                        entity: Member::NAME,
                        waited_ms,
                    });
                }
                Err(err.into())
            }
        }
    }
}

impl MemberRepository for SqliteMemberRepository<'_> {
    fn save(&self, member: &mut Member) -> RepoResult<MemberId> {
        let team_id = team_foreign_key(member)?;

        let id = match member.id {
            None => {
                self.conn.execute(
                    "INSERT INTO member (username, age, team_id) VALUES (?1, ?2, ?3);",
                    params![member.username.as_str(), member.age, team_id],
                )?;
                let id = self.conn.last_insert_rowid();
                member.id = Some(id);
                debug!("event=member_save module=repo status=ok mode=insert member_id={id}");
                id
            }
            Some(id) => {
                self.conn.execute(
                    "INSERT INTO member (member_id, username, age, team_id)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (member_id) DO UPDATE SET
                        username = excluded.username,
                        age = excluded.age,
                        team_id = excluded.team_id;",
                    params![id, member.username.as_str(), member.age, team_id],
                )?;
                debug!("event=member_save module=repo status=ok mode=upsert member_id={id}");
                id
            }
        };

        Ok(id)
    }

    fn delete(&self, member: &Member) -> RepoResult<()> {
        let Some(id) = member.id else {
            debug!("event=member_delete module=repo status=skipped reason=transient");
            return Ok(());
        };

        let changed = self
            .conn
            .execute("DELETE FROM member WHERE member_id = ?1;", [id])?;
        if changed == 0 {
            debug!("event=member_delete module=repo status=skipped reason=absent member_id={id}");
        } else {
            debug!("event=member_delete module=repo status=ok member_id={id}");
        }
        Ok(())
    }

    fn find(&self, query: &MemberQuery) -> RepoResult<Vec<Member>> {
        if query.lock == LockMode::PessimisticWrite {
            self.acquire_write_lock(query)?;
        }

        let (sql, binds) = query.select_sql();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut members = Vec::new();

        while let Some(row) = rows.next()? {
            members.push(parse_member_row(row, query.fetch, self.session)?);
        }

        Ok(members)
    }

    fn count_matching(&self, query: &MemberQuery) -> RepoResult<u64> {
        let (sql, binds) = query.count_sql();
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        row_count(count, Member::NAME)
    }

    fn bulk_age_add(&self, age_threshold: i32, delta: i32) -> RepoResult<usize> {
        let started_at = Instant::now();
        let changed = match self.conn.execute(
            "UPDATE member SET age = age + ?1 WHERE age >= ?2;",
            params![delta, age_threshold],
        ) {
            Ok(changed) => changed,
            Err(err) => {
                error!(
                    "event=member_bulk_update module=repo status=error age_threshold={} delta={} duration_ms={} error={}",
                    age_threshold,
                    delta,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };
        info!(
            "event=member_bulk_update module=repo status=ok rows={} age_threshold={} delta={} duration_ms={}",
            changed,
            age_threshold,
            delta,
            started_at.elapsed().as_millis()
        );
        Ok(changed)
    }

    fn find_usernames(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT username FROM member ORDER BY member_id ASC;")?;
        let usernames = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(usernames)
    }

    fn find_member_dtos(&self) -> RepoResult<Vec<MemberDto>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.member_id, m.username, t.name
             FROM member m
             JOIN team t ON t.team_id = m.team_id
             ORDER BY m.member_id ASC;",
        )?;
        let dtos = stmt
            .query_map([], |row| {
                Ok(MemberDto::new(
                    row.get(0)?,
                    row.get::<_, String>(1)?,
                    row.get(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dtos)
    }

    fn load_team(&self, member: &Member) -> RepoResult<Option<Team>> {
        match &member.team {
            None => Ok(None),
            Some(Relation::Loaded(team)) => Ok(Some(team.clone())),
            Some(Relation::Unloaded { id, session }) => {
                if *session != self.session {
                    return Err(RepoError::DetachedRelation {
                        target: Team::NAME,
                        id: *id,
                    });
                }
                let team = SqliteTeamRepository::attached(self.conn, self.session)
                    .find_by_id(*id)?
                    .ok_or_else(|| {
                        RepoError::InvalidData(format!(
                            "member.team_id `{id}` points at a missing team"
                        ))
                    })?;
                Ok(Some(team))
            }
        }
    }
}

pub(crate) fn parse_member_row(
    row: &Row<'_>,
    fetch: FetchPlan,
    session: SessionId,
) -> RepoResult<Member> {
    let team_id: Option<TeamId> = row.get("team_id")?;
    let team = match (team_id, fetch) {
        (None, _) => None,
        (Some(id), FetchPlan::Lazy) => Some(Relation::Unloaded { id, session }),
        (Some(id), FetchPlan::JoinTeam) => {
            let name: Option<String> = row.get("team_name")?;
            let name = name.ok_or_else(|| {
                RepoError::InvalidData(format!("member.team_id `{id}` points at a missing team"))
            })?;
            Some(Relation::Loaded(Team {
                id: Some(id),
                name,
                members: Vec::new(),
            }))
        }
    };

    Ok(Member {
        id: Some(row.get("member_id")?),
        username: row.get("username")?,
        age: row.get("age")?,
        team,
    })
}

fn team_foreign_key(member: &Member) -> RepoResult<Option<TeamId>> {
    match &member.team {
        None => Ok(None),
        Some(relation) => relation
            .id()
            .map(Some)
            .ok_or(RepoError::TransientReference {
                entity: Member::NAME,
                target: Team::NAME,
            }),
    }
}
