use chrono::Utc;
use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    auth::{AuthToken, Voter},
    db::MongoLedger,
    feed::{Change, ChangeFeed},
    ledger::{self, VoteReceipt},
    mongodb::{Coll, Id},
    vote::{Vote, VoteDescription, VoteOutcome},
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, get_own_votes]
}

/// A vote the caller wishes to cast: the candidate implies the position and
/// election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSpec {
    pub candidate_id: Id,
}

/// Cast or change the caller's vote for whatever position the candidate
/// stands for. Idempotent: repeating the same choice is `unchanged`.
#[post("/elections/vote", data = "<spec>", format = "json")]
async fn cast_vote(
    token: AuthToken<Voter>,
    spec: Json<VoteSpec>,
    store: MongoLedger,
    feed: &State<ChangeFeed>,
) -> Result<Json<VoteReceipt>> {
    let receipt =
        ledger::cast_or_change_vote(&store, token.id(), spec.candidate_id, Utc::now()).await?;

    // Only actual mutations are worth a recomputation downstream.
    if receipt.outcome != VoteOutcome::Unchanged {
        feed.publish(Change::Votes {
            election_id: receipt.election_id,
        });
    }

    Ok(Json(receipt))
}

/// The caller's own voting history, across all elections.
#[get("/voter/votes")]
async fn get_own_votes(
    token: AuthToken<Voter>,
    votes: Coll<Vote>,
) -> Result<Json<Vec<VoteDescription>>> {
    let filter = doc! { "voter_id": token.id() };
    let own: Vec<Vote> = votes.find(filter, None).await?.try_collect().await?;
    Ok(Json(own.iter().map(VoteDescription::from).collect()))
}
