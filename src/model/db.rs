use mongodb::{
    bson::doc,
    error::{Error as DbError, ErrorKind, WriteFailure},
    Database,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::error::{Error, Result};
use crate::model::{
    candidate::Candidate,
    election::Election,
    ledger::LedgerStore,
    mongodb::{Coll, Id},
    participant::Participant,
    position::Position,
    vote::{NewVote, Vote},
};

/// MongoDB E11000: unique index violation.
const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &DbError) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write_err))
            if write_err.code == DUPLICATE_KEY
    )
}

/// The MongoDB-backed [`LedgerStore`]. Point lookups go through the typed
/// collections; the conditional vote insert relies on the unique
/// `(voter_id, position_id)` index to reject the loser of a write race.
pub struct MongoLedger {
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    participants: Coll<Participant>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
}

impl MongoLedger {
    pub fn from_db(db: &Database) -> Self {
        Self {
            elections: Coll::from_db(db),
            positions: Coll::from_db(db),
            candidates: Coll::from_db(db),
            participants: Coll::from_db(db),
            votes: Coll::from_db(db),
            new_votes: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for MongoLedger {
    type Error = ();

    /// Build the ledger store from the managed database.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(MongoLedger::from_db(db))
    }
}

#[rocket::async_trait]
impl LedgerStore for MongoLedger {
    async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.candidates.find_one(id.as_doc(), None).await?)
    }

    async fn position(&self, id: Id) -> Result<Option<Position>> {
        Ok(self.positions.find_one(id.as_doc(), None).await?)
    }

    async fn election(&self, id: Id) -> Result<Option<Election>> {
        Ok(self.elections.find_one(id.as_doc(), None).await?)
    }

    async fn participant(&self, id: Id) -> Result<Option<Participant>> {
        Ok(self.participants.find_one(id.as_doc(), None).await?)
    }

    async fn find_vote(&self, voter_id: Id, position_id: Id) -> Result<Option<Vote>> {
        let filter = doc! {
            "voter_id": voter_id,
            "position_id": position_id,
        };
        Ok(self.votes.find_one(filter, None).await?)
    }

    async fn insert_vote(&self, vote: &NewVote) -> Result<Id> {
        let result = self.new_votes.insert_one(vote, None).await;
        match result {
            Ok(inserted) => Ok(inserted
                .inserted_id
                .as_object_id()
                .unwrap() // Valid because the ID comes directly from the DB.
                .into()),
            Err(err) if is_duplicate_key(&err) => Err(Error::VoteConflict),
            Err(err) => Err(err.into()),
        }
    }

    async fn reassign_vote(&self, vote_id: Id, candidate_id: Id) -> Result<()> {
        let update = doc! {
            "$set": { "candidate_id": candidate_id }
        };
        self.votes
            .update_one(vote_id.as_doc(), update, None)
            .await?;
        Ok(())
    }
}
