use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core position data, as stored in the database.
/// A position is a single contest within an election, with its own slate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCore {
    /// Position title, e.g. "President".
    pub title: String,
    /// The election this position belongs to.
    pub election_id: Id,
    /// Maximum number of candidates admitted to the slate.
    pub max_candidates: u32,
}

/// A position without an ID.
pub type NewPosition = PositionCore;

/// A position from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub position: PositionCore,
}

impl Deref for Position {
    type Target = PositionCore;

    fn deref(&self) -> &Self::Target {
        &self.position
    }
}

impl DerefMut for Position {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.position
    }
}

/// A position as submitted by an admin; the election comes from the URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSpec {
    pub title: String,
    pub max_candidates: u32,
}

impl PositionSpec {
    /// Attach the owning election to form the stored record.
    pub fn into_core(self, election_id: Id) -> PositionCore {
        PositionCore {
            title: self.title,
            election_id,
            max_candidates: self.max_candidates,
        }
    }
}
