use mongodb::bson::doc;
use rocket::{
    futures::TryStreamExt,
    response::stream::{Event, EventStream},
    serde::json::Json,
    tokio::{select, sync::broadcast::error::RecvError},
    Route, Shutdown, State,
};

use crate::error::{Error, Result};
use crate::model::{
    candidate::Candidate,
    election::Election,
    feed::ChangeFeed,
    mongodb::{Coll, Id},
    results::{tally, ElectionResults},
    vote::Vote,
};

pub fn routes() -> Vec<Route> {
    routes![get_results, live_results]
}

/// Recompute the tally for one election from its raw vote rows.
async fn election_results(
    election_id: Id,
    elections: &Coll<Election>,
    candidates: &Coll<Candidate>,
    votes: &Coll<Vote>,
) -> Result<ElectionResults> {
    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or(Error::UnknownElection(election_id))?;

    let filter = doc! { "election_id": election.id };
    let candidates: Vec<Candidate> = candidates
        .find(filter.clone(), None)
        .await?
        .try_collect()
        .await?;
    let votes: Vec<Vote> = votes.find(filter, None).await?.try_collect().await?;

    Ok(tally(election.id, &candidates, &votes))
}

#[get("/elections/<election_id>/results")]
async fn get_results(
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionResults>> {
    let results = election_results(election_id, &elections, &candidates, &votes).await?;
    Ok(Json(results))
}

/// Server-sent events stream of the election's tally: one event up front,
/// then a fresh recomputation after every vote or catalog change touching
/// this election. Recompute-on-change, never incremental patching.
#[get("/elections/<election_id>/results/live")]
async fn live_results(
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    feed: &State<ChangeFeed>,
    mut end: Shutdown,
) -> Result<EventStream![]> {
    // Subscribe before the initial tally so no change can slip between them.
    let mut changes = feed.subscribe();
    let initial = election_results(election_id, &elections, &candidates, &votes).await?;

    Ok(EventStream! {
        yield Event::json(&initial);
        loop {
            let change = select! {
                change = changes.recv() => match change {
                    Ok(change) => change,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = &mut end => break,
            };
            if !change.touches_election(election_id) {
                continue;
            }
            match election_results(election_id, &elections, &candidates, &votes).await {
                Ok(results) => yield Event::json(&results),
                // The election may have been deleted mid-stream.
                Err(_) => break,
            }
        }
    })
}
