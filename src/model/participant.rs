use std::ops::{Deref, DerefMut};

use argon2::Config as Argon2Config;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{opt_chrono_datetime_as_bson_datetime, Id};

/// The trust role of a participant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Registered but not yet approved; cannot vote.
    Pending,
    /// Approved to cast ballots.
    Voter,
    /// May manage the catalog and other participants.
    Admin,
}

/// Core participant data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantCore {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    /// When an admin approved this participant as a voter.
    /// Eligibility requires both the `Voter` role and this timestamp; a
    /// `Voter` missing it is an inconsistent intermediate state that must be
    /// treated as ineligible, not crashed on.
    #[serde(default, with = "opt_chrono_datetime_as_bson_datetime")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl ParticipantCore {
    /// Register a new pending participant, hashing their password.
    pub fn register(credentials: Credentials) -> Self {
        Self {
            username: credentials.username,
            password_hash: hash_password(&credentials.password),
            role: Role::Pending,
            approved_at: None,
        }
    }

    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // Unwrap safe: the only way to create a ParticipantCore is via
        // `register`, so the stored hash is always well-formed.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap()
    }

    /// Is this participant currently eligible to cast ballots?
    /// Both halves of the condition are authoritative: role alone is not enough.
    pub fn can_vote(&self) -> bool {
        self.role == Role::Voter && self.approved_at.is_some()
    }

    /// Assign a new role, maintaining the approval timestamp invariant:
    /// approval as a voter stamps the time, any other role clears it so a
    /// later role flip cannot resurrect a stale approval.
    pub fn set_role(&mut self, role: Role, now: DateTime<Utc>) {
        self.approved_at = match role {
            Role::Voter => Some(now),
            Role::Pending | Role::Admin => None,
        };
        self.role = role;
    }
}

fn hash_password(password: &str) -> String {
    // 16-byte salt, as recommended for argon2.
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &Argon2Config::default())
        .unwrap() // Safe because the default `Config` is valid.
}

/// A participant without an ID.
pub type NewParticipant = ParticipantCore;

/// A participant from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub participant: ParticipantCore,
}

impl Deref for Participant {
    type Target = ParticipantCore;

    fn deref(&self) -> &Self::Target {
        &self.participant
    }
}

impl DerefMut for Participant {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.participant
    }
}

/// Raw login/registration credentials, received from a user.
/// Never stored directly, since the password is in plaintext.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A participant as returned to callers; no password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDescription {
    pub id: Id,
    pub username: String,
    pub role: Role,
    pub approved_at: Option<DateTime<Utc>>,
}

impl From<&Participant> for ParticipantDescription {
    fn from(participant: &Participant) -> Self {
        Self {
            id: participant.id,
            username: participant.username.clone(),
            role: participant.role,
            approved_at: participant.approved_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl ParticipantCore {
        pub fn example() -> Self {
            Self::register(Credentials::example())
        }
    }

    impl Participant {
        pub fn example() -> Self {
            Self {
                id: Id::new(),
                participant: ParticipantCore::example(),
            }
        }
    }

    impl Credentials {
        pub fn example() -> Self {
            Self {
                username: "jsmith".into(),
                password: "correct horse battery staple".into(),
            }
        }
    }

    #[test]
    fn registration_starts_pending() {
        let participant = ParticipantCore::example();
        assert_eq!(participant.role, Role::Pending);
        assert!(participant.approved_at.is_none());
        assert!(!participant.can_vote());
    }

    #[test]
    fn password_verification() {
        let participant = ParticipantCore::example();
        assert!(participant.verify_password(Credentials::example().password));
        assert!(!participant.verify_password("wrong horse"));
    }

    #[test]
    fn approval_stamps_the_timestamp() {
        let mut participant = ParticipantCore::example();
        let now = Utc::now();
        participant.set_role(Role::Voter, now);
        assert_eq!(participant.role, Role::Voter);
        assert_eq!(participant.approved_at, Some(now));
        assert!(participant.can_vote());
    }

    #[test]
    fn demotion_clears_the_timestamp() {
        let mut participant = ParticipantCore::example();
        participant.set_role(Role::Voter, Utc::now());
        participant.set_role(Role::Pending, Utc::now());
        assert!(participant.approved_at.is_none());
        assert!(!participant.can_vote());

        // Promotion to admin is also "away from voter".
        participant.set_role(Role::Voter, Utc::now());
        participant.set_role(Role::Admin, Utc::now());
        assert!(participant.approved_at.is_none());
        assert!(!participant.can_vote());
    }

    #[test]
    fn voter_without_approval_is_ineligible() {
        // The inconsistent intermediate state must be tolerated, not crashed on.
        let mut participant = ParticipantCore::example();
        participant.role = Role::Voter;
        participant.approved_at = None;
        assert!(!participant.can_vote());
    }
}
