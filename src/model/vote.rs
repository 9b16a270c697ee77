use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{candidate::Candidate, mongodb::Id};

/// Core vote data, as stored in the database.
///
/// At most one row may exist per `(voter_id, position_id)` pair; this is
/// enforced by a unique index, not application-level checks. A change of
/// heart reassigns `candidate_id` in place, preserving the row identity and
/// creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub voter_id: Id,
    pub election_id: Id,
    pub position_id: Id,
    pub candidate_id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub creation_time: DateTime<Utc>,
}

impl VoteCore {
    /// A fresh vote for the given candidate, stamped with `now`.
    pub fn new(voter_id: Id, candidate: &Candidate, now: DateTime<Utc>) -> Self {
        Self {
            voter_id,
            election_id: candidate.election_id,
            position_id: candidate.position_id,
            candidate_id: candidate.id,
            creation_time: now,
        }
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

impl DerefMut for Vote {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.vote
    }
}

/// What a cast-or-change call did to the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOutcome {
    /// A new vote row was created.
    Cast,
    /// An existing row was reassigned to a different candidate.
    Changed,
    /// The existing row already named this candidate; nothing to do.
    Unchanged,
}

/// A vote as returned to callers, with plain JSON timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDescription {
    pub id: Id,
    pub election_id: Id,
    pub position_id: Id,
    pub candidate_id: Id,
    pub creation_time: DateTime<Utc>,
}

impl From<&Vote> for VoteDescription {
    fn from(vote: &Vote) -> Self {
        Self {
            id: vote.id,
            election_id: vote.election_id,
            position_id: vote.position_id,
            candidate_id: vote.candidate_id,
            creation_time: vote.creation_time,
        }
    }
}
