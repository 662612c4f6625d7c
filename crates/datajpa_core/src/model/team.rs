//! Team domain model.
//!
//! # Invariants
//! - `members` is a view of the members pointing at this team; the team does
//!   not own them and saving a team never writes member rows.

use crate::model::entity::Entity;
use crate::model::member::MemberId;

/// Storage-assigned team identifier.
pub type TeamId = i64;

/// Entry of a team's back-reference view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMember {
    /// `None` while the member has not been saved yet.
    pub id: Option<MemberId>,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: Option<TeamId>,
    pub name: String,
    pub members: Vec<TeamMember>,
}

impl Team {
    /// Creates a transient team with an empty member view.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Copy of this team without its member view.
    pub(crate) fn header(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            members: Vec::new(),
        }
    }
}

impl Entity for Team {
    const NAME: &'static str = "team";

    fn id(&self) -> Option<i64> {
        self.id
    }
}
