use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::{mongodb::Id, position::Position};

/// Core candidate data, as stored in the database.
///
/// The `election_id` is denormalised from the owning position; the two must
/// agree, and the vote ledger rejects any candidate for which they do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    /// Candidate display name.
    pub name: String,
    /// Party or affiliation label.
    pub party: String,
    /// The election this candidate stands in.
    pub election_id: Id,
    /// The position this candidate stands for.
    pub position_id: Id,
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

/// A candidate as submitted by an admin; the position comes from the URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    pub party: String,
}

impl CandidateSpec {
    /// Attach the owning position to form the stored record. The election
    /// reference is taken from the position, so a freshly created candidate
    /// can never be catalog-inconsistent.
    pub fn into_core(self, position: &Position) -> CandidateCore {
        CandidateCore {
            name: self.name,
            party: self.party,
            election_id: position.election_id,
            position_id: position.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Candidate {
        pub fn example(position: &Position) -> Self {
            Self {
                id: Id::new(),
                candidate: CandidateCore {
                    name: "Jo Smith".to_string(),
                    party: "Independent".to_string(),
                    election_id: position.election_id,
                    position_id: position.id,
                },
            }
        }
    }
}
