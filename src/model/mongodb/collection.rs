use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::{
    candidate::{Candidate, CandidateCore},
    election::{Election, ElectionCore},
    participant::{Participant, ParticipantCore},
    position::{Position, PositionCore},
    vote::{Vote, VoteCore},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// Participant collections
const PARTICIPANTS: &str = "participants";
impl MongoCollection for Participant {
    const NAME: &'static str = PARTICIPANTS;
}
impl MongoCollection for ParticipantCore {
    const NAME: &'static str = PARTICIPANTS;
}

// Election collections
const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}
impl MongoCollection for ElectionCore {
    const NAME: &'static str = ELECTIONS;
}

// Position collections
const POSITIONS: &str = "positions";
impl MongoCollection for Position {
    const NAME: &'static str = POSITIONS;
}
impl MongoCollection for PositionCore {
    const NAME: &'static str = POSITIONS;
}

// Candidate collections
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}
impl MongoCollection for CandidateCore {
    const NAME: &'static str = CANDIDATES;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for VoteCore {
    const NAME: &'static str = VOTES;
}

/// Ensure that all the required indexes exist on the given database.
///
/// The unique index on `(voter_id, position_id)` is load-bearing: it is the
/// atomic guarantee that two concurrent first casts for the same position
/// resolve to exactly one surviving vote row.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Participant collection.
    let participant_index = IndexModel::builder()
        .keys(doc! { "username": 1 })
        .options(unique.clone())
        .build();
    Coll::<Participant>::from_db(db)
        .create_index(participant_index, None)
        .await?;

    // Vote collection: at most one vote per voter per position.
    let vote_index = IndexModel::builder()
        .keys(doc! { "voter_id": 1, "position_id": 1 })
        .options(unique)
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(vote_index, None)
        .await?;

    // Position collection, for per-election listing.
    let position_index = IndexModel::builder()
        .keys(doc! { "election_id": 1 })
        .build();
    Coll::<Position>::from_db(db)
        .create_index(position_index, None)
        .await?;

    // Candidate collection, for per-election and per-position listing.
    let candidate_index = IndexModel::builder()
        .keys(doc! { "election_id": 1, "position_id": 1 })
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    Ok(())
}
