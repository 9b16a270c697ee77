use std::fmt::{self, Display, Formatter};
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core election data, as stored in the database.
///
/// Note that the lifecycle state is deliberately absent: it is derived from
/// the voting window on every read via [`ElectionCore::state_at`], never
/// stored, since "now" moves independently of any write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election title.
    pub title: String,
    /// Human-readable description.
    pub description: String,
    /// Start of the voting window.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// End of the voting window (inclusive).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
}

impl ElectionCore {
    /// Resolve the lifecycle state at the given instant.
    ///
    /// Total over all timestamp orderings: a degenerate window
    /// (`start_time >= end_time`) simply never resolves to `Active`.
    pub fn state_at(&self, now: DateTime<Utc>) -> ElectionState {
        if now < self.start_time {
            ElectionState::Upcoming
        } else if now <= self.end_time {
            ElectionState::Active
        } else {
            ElectionState::Ended
        }
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// The time-derived phase of an election.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionState {
    /// The voting window has not opened yet.
    Upcoming,
    /// The voting window is open; casting is permitted.
    Active,
    /// The voting window has closed.
    Ended,
}

impl Display for ElectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Upcoming => "upcoming",
                Self::Active => "active",
                Self::Ended => "ended",
            }
        )
    }
}

/// An election as submitted by an admin, with plain JSON timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ElectionSpec {
    /// Check the voting window is well-formed.
    pub fn validate(&self) -> Result<(), String> {
        if self.start_time < self.end_time {
            Ok(())
        } else {
            Err(format!(
                "Election must start before it ends (start {}, end {})",
                self.start_time, self.end_time
            ))
        }
    }
}

impl From<ElectionSpec> for ElectionCore {
    fn from(spec: ElectionSpec) -> Self {
        Self {
            title: spec.title,
            description: spec.description,
            start_time: spec.start_time,
            end_time: spec.end_time,
        }
    }
}

/// An election as returned to callers, with the lifecycle state stamped on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub state: ElectionState,
}

impl ElectionDescription {
    /// Describe the given election as of `now`.
    pub fn new(election: &Election, now: DateTime<Utc>) -> Self {
        Self {
            id: election.id,
            title: election.title.clone(),
            description: election.description.clone(),
            start_time: election.start_time,
            end_time: election.end_time,
            state: election.state_at(now),
        }
    }
}
