//! Member domain model.
//!
//! # Responsibility
//! - Define the member record and its many-to-one link to a team.
//! - Keep the team's back-reference view in step when the link changes.
//!
//! # Invariants
//! - `id` is assigned by storage on first save and never changes afterwards.
//! - `age` defaults to 0.

use crate::model::entity::{Entity, Relation};
use crate::model::team::{Team, TeamId, TeamMember};
use serde::{Deserialize, Serialize};

/// Storage-assigned member identifier.
pub type MemberId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: Option<MemberId>,
    pub username: String,
    pub age: i32,
    /// Nullable many-to-one link. Lazy queries leave it `Unloaded`.
    pub team: Option<Relation<Team>>,
}

impl Member {
    /// Creates a transient member with age 0 and no team.
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_age(username, 0)
    }

    pub fn with_age(username: impl Into<String>, age: i32) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team: None,
        }
    }

    /// Creates a transient member already assigned to `team`.
    pub fn with_team(username: impl Into<String>, age: i32, team: &mut Team) -> Self {
        let mut member = Self::with_age(username, age);
        member.change_team(team);
        member
    }

    /// Points this member at `team` and records it in the team's member view.
    pub fn change_team(&mut self, team: &mut Team) {
        let already_listed =
            self.id.is_some() && team.members.iter().any(|entry| entry.id == self.id);
        if !already_listed {
            team.members.push(TeamMember {
                id: self.id,
                username: self.username.clone(),
            });
        }
        self.team = Some(Relation::Loaded(team.header()));
    }

    /// Foreign key of the linked team, if any.
    pub fn team_id(&self) -> Option<TeamId> {
        self.team.as_ref().and_then(|relation| relation.id())
    }
}

impl Entity for Member {
    const NAME: &'static str = "member";

    fn id(&self) -> Option<i64> {
        self.id
    }
}

/// Flat projection of a member joined with its team name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: MemberId,
    pub username: String,
    #[serde(rename = "teamname")]
    pub team_name: Option<String>,
}

impl MemberDto {
    pub fn new(id: MemberId, username: impl Into<String>, team_name: Option<String>) -> Self {
        Self {
            id,
            username: username.into(),
            team_name,
        }
    }
}
