use std::fmt::{self, Display, Formatter};

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::participant::{Participant, Role};

/// A marker type selecting the rights an [`super::AuthToken`] must carry.
pub trait User {
    const RIGHTS: Rights;
}

/// Marker for voter-rights tokens. Uninhabited: only used at the type level.
pub enum Voter {}

impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;
}

/// Marker for admin-rights tokens. Uninhabited: only used at the type level.
pub enum Admin {}

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;
}

/// The rights a token grants. Voter rights are issued to every ordinary
/// participant, including pending ones: actual voting eligibility is the
/// ledger's decision, not the token's.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Admin = 1,
}

impl Rights {
    /// The rights a participant's role entitles them to.
    pub fn for_participant(participant: &Participant) -> Self {
        match participant.role {
            Role::Admin => Rights::Admin,
            Role::Voter | Role::Pending => Rights::Voter,
        }
    }
}

impl Display for Rights {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}
