use log::{error, warn};
use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::model::{election::ElectionState, mongodb::Id};

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a handler can return. Each variant maps to a distinct,
/// caller-usable response; nothing in here is fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("No candidate found with ID {0}")]
    UnknownCandidate(Id),
    #[error("No election found with ID {0}")]
    UnknownElection(Id),
    #[error("No participant found with ID {0}")]
    UnknownParticipant(Id),
    /// The candidate's stored election disagrees with its position's owning
    /// election. Upstream catalog corruption; never silently repaired.
    #[error("Candidate {candidate} does not belong to the election of its position")]
    InconsistentCatalog { candidate: Id },
    /// Carries the offending state so callers can distinguish
    /// "not started yet" from "already closed".
    #[error("Voting is not open: the election is {0}")]
    VotingNotOpen(ElectionState),
    #[error("Participant {0} is not eligible to vote")]
    VoterNotEligible(Id),
    /// The storage layer's unique index detected a concurrent write race.
    #[error("A concurrent vote for the same position was detected")]
    VoteConflict,
    #[error(transparent)]
    Db(#[from] mongodb::error::Error),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = match &self {
            Self::UnknownCandidate(_)
            | Self::UnknownElection(_)
            | Self::UnknownParticipant(_)
            | Self::NotFound(_) => Status::NotFound,
            Self::InconsistentCatalog { .. } => Status::InternalServerError,
            Self::VotingNotOpen(_) | Self::VoterNotEligible(_) => Status::Forbidden,
            Self::VoteConflict | Self::Conflict(_) => Status::Conflict,
            Self::Db(_) => Status::InternalServerError,
            Self::Jwt(_) | Self::Unauthorized(_) => Status::Unauthorized,
            Self::BadRequest(_) => Status::BadRequest,
        };
        if status.code >= 500 {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        Err(status)
    }
}
