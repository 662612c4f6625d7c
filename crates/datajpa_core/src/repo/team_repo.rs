//! Team repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over `team` storage.
//! - Build the read-only member view of a team from `member.team_id`.
//!
//! # Invariants
//! - Saving a team never writes member rows.
//! - Deleting a team that members still point at fails with
//!   `RepoError::ConstraintViolation`.

use crate::model::entity::{Entity, SessionId};
use crate::model::member::Member;
use crate::model::team::{Team, TeamId, TeamMember};
use crate::query::MemberQuery;
use crate::repo::{ensure_connection_ready, row_count};
use crate::repo::member_repo::{MemberRepository, RepoResult, SqliteMemberRepository};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Repository interface for team operations.
pub trait TeamRepository {
    /// Inserts a transient team or upserts a persisted one.
    fn save(&self, team: &mut Team) -> RepoResult<TeamId>;
    /// Loads one team without its member view.
    fn find_by_id(&self, id: TeamId) -> RepoResult<Option<Team>>;
    fn find_all(&self) -> RepoResult<Vec<Team>>;
    fn count(&self) -> RepoResult<u64>;
    /// Removes the team row. Absent rows are ignored.
    fn delete(&self, team: &Team) -> RepoResult<()>;
    /// Members whose `team_id` points at `team_id`, in id order.
    fn find_members(&self, team_id: TeamId) -> RepoResult<Vec<Member>>;

    /// Loads one team with its member view populated.
    fn find_with_members(&self, id: TeamId) -> RepoResult<Option<Team>> {
        let Some(mut team) = self.find_by_id(id)? else {
            return Ok(None);
        };
        team.members = self
            .find_members(id)?
            .into_iter()
            .map(|member| TeamMember {
                id: member.id,
                username: member.username,
            })
            .collect();
        Ok(Some(team))
    }
}

/// SQLite-backed team repository.
pub struct SqliteTeamRepository<'conn> {
    conn: &'conn Connection,
    session: SessionId,
}

impl<'conn> SqliteTeamRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self::attached(conn, SessionId::new()))
    }

    pub(crate) fn attached(conn: &'conn Connection, session: SessionId) -> Self {
        Self { conn, session }
    }
}

impl TeamRepository for SqliteTeamRepository<'_> {
    fn save(&self, team: &mut Team) -> RepoResult<TeamId> {
        let id = match team.id {
            None => {
                self.conn.execute(
                    "INSERT INTO team (name) VALUES (?1);",
                    [team.name.as_str()],
                )?;
                let id = self.conn.last_insert_rowid();
                team.id = Some(id);
                debug!("event=team_save module=repo status=ok mode=insert team_id={id}");
                id
            }
            Some(id) => {
                self.conn.execute(
                    "INSERT INTO team (team_id, name) VALUES (?1, ?2)
                     ON CONFLICT (team_id) DO UPDATE SET name = excluded.name;",
                    params![id, team.name.as_str()],
                )?;
                debug!("event=team_save module=repo status=ok mode=upsert team_id={id}");
                id
            }
        };

        Ok(id)
    }

    fn find_by_id(&self, id: TeamId) -> RepoResult<Option<Team>> {
        let team = self
            .conn
            .query_row(
                "SELECT team_id, name FROM team WHERE team_id = ?1;",
                [id],
                parse_team_row,
            )
            .optional()?;
        Ok(team)
    }

    fn find_all(&self) -> RepoResult<Vec<Team>> {
        let mut stmt = self
            .conn
            .prepare("SELECT team_id, name FROM team ORDER BY team_id ASC;")?;
        let teams = stmt
            .query_map([], parse_team_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    fn count(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM team;", [], |row| row.get(0))?;
        row_count(count, Team::NAME)
    }

    fn delete(&self, team: &Team) -> RepoResult<()> {
        let Some(id) = team.id else {
            return Ok(());
        };
        let changed = self
            .conn
            .execute("DELETE FROM team WHERE team_id = ?1;", [id])?;
        debug!(
            "event=team_delete module=repo status={} team_id={id}",
            if changed == 0 { "skipped" } else { "ok" }
        );
        Ok(())
    }

    fn find_members(&self, team_id: TeamId) -> RepoResult<Vec<Member>> {
        SqliteMemberRepository::attached(self.conn, self.session)
            .find(&MemberQuery::new().team_id_eq(team_id))
    }
}

fn parse_team_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        members: Vec::new(),
    })
}
