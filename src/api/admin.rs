use chrono::Utc;
use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    auth::{Admin, AuthToken},
    candidate::{Candidate, CandidateSpec, NewCandidate},
    election::{Election, ElectionDescription, ElectionSpec, NewElection},
    feed::{Change, ChangeFeed},
    mongodb::{Coll, Id},
    participant::{Participant, ParticipantDescription, Role},
    position::{NewPosition, Position, PositionSpec},
    vote::Vote,
};

pub fn routes() -> Vec<Route> {
    routes![
        get_participants,
        set_participant_role,
        reject_participant,
        create_election,
        update_election,
        delete_election,
        create_position,
        delete_position,
        create_candidate,
        delete_candidate,
    ]
}

// ---- Participant management ----

#[get("/participants")]
async fn get_participants(
    _token: AuthToken<Admin>,
    participants: Coll<Participant>,
) -> Result<Json<Vec<ParticipantDescription>>> {
    let all: Vec<Participant> = participants.find(None, None).await?.try_collect().await?;
    Ok(Json(all.iter().map(ParticipantDescription::from).collect()))
}

/// The role to assign to a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub role: Role,
}

/// Assign a role. Approval as a voter stamps the approval time; any other
/// role clears it, so a role flip can never resurrect a stale approval.
#[post("/participants/<participant_id>/role", data = "<spec>", format = "json")]
async fn set_participant_role(
    _token: AuthToken<Admin>,
    participant_id: Id,
    spec: Json<RoleSpec>,
    participants: Coll<Participant>,
    feed: &State<ChangeFeed>,
) -> Result<Json<ParticipantDescription>> {
    let mut participant = participants
        .find_one(participant_id.as_doc(), None)
        .await?
        .ok_or(Error::UnknownParticipant(participant_id))?;

    participant.set_role(spec.role, Utc::now());
    participants
        .replace_one(participant_id.as_doc(), &participant, None)
        .await?;
    feed.publish(Change::Participants);

    Ok(Json(ParticipantDescription::from(&participant)))
}

/// Reject (delete) a participant outright. Irreversible. Refused once they
/// have cast votes, since their ballots must keep resolving.
#[delete("/participants/<participant_id>")]
async fn reject_participant(
    _token: AuthToken<Admin>,
    participant_id: Id,
    participants: Coll<Participant>,
    votes: Coll<Vote>,
    feed: &State<ChangeFeed>,
) -> Result<()> {
    let cast = votes
        .count_documents(doc! { "voter_id": participant_id }, None)
        .await?;
    if cast > 0 {
        return Err(Error::Conflict(format!(
            "Participant {participant_id} has cast votes and cannot be removed"
        )));
    }

    let result = participants
        .delete_one(participant_id.as_doc(), None)
        .await?;
    if result.deleted_count == 0 {
        return Err(Error::UnknownParticipant(participant_id));
    }
    feed.publish(Change::Participants);
    Ok(())
}

// ---- Election management ----

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    _token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    new_elections: Coll<NewElection>,
    feed: &State<ChangeFeed>,
) -> Result<Json<ElectionDescription>> {
    spec.validate().map_err(Error::BadRequest)?;

    let election: NewElection = spec.0.into();
    let election_id: Id = new_elections
        .insert_one(&election, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();

    feed.publish(Change::Catalog { election_id });
    let election = Election {
        id: election_id,
        election,
    };
    Ok(Json(ElectionDescription::new(&election, Utc::now())))
}

#[put("/elections/<election_id>", data = "<spec>", format = "json")]
async fn update_election(
    _token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<ElectionSpec>,
    elections: Coll<Election>,
    feed: &State<ChangeFeed>,
) -> Result<Json<ElectionDescription>> {
    spec.validate().map_err(Error::BadRequest)?;

    let election = Election {
        id: election_id,
        election: spec.0.into(),
    };
    let result = elections
        .replace_one(election_id.as_doc(), &election, None)
        .await?;
    if result.matched_count == 0 {
        return Err(Error::UnknownElection(election_id));
    }

    feed.publish(Change::Catalog { election_id });
    Ok(Json(ElectionDescription::new(&election, Utc::now())))
}

/// Delete an election and its positions and candidates. Refused while any
/// vote row references the election; votes are never cascade-deleted.
#[delete("/elections/<election_id>")]
async fn delete_election(
    _token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    feed: &State<ChangeFeed>,
) -> Result<()> {
    let filter = doc! { "election_id": election_id };
    let cast = votes.count_documents(filter.clone(), None).await?;
    if cast > 0 {
        return Err(Error::Conflict(format!(
            "Election {election_id} has {cast} votes and cannot be deleted"
        )));
    }

    let result = elections.delete_one(election_id.as_doc(), None).await?;
    if result.deleted_count == 0 {
        return Err(Error::UnknownElection(election_id));
    }
    candidates.delete_many(filter.clone(), None).await?;
    positions.delete_many(filter, None).await?;

    feed.publish(Change::Catalog { election_id });
    Ok(())
}

// ---- Position management ----

#[post(
    "/elections/<election_id>/positions",
    data = "<spec>",
    format = "json"
)]
async fn create_position(
    _token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<PositionSpec>,
    elections: Coll<Election>,
    new_positions: Coll<NewPosition>,
    feed: &State<ChangeFeed>,
) -> Result<Json<Position>> {
    elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or(Error::UnknownElection(election_id))?;

    let position = spec.0.into_core(election_id);
    let position_id: Id = new_positions
        .insert_one(&position, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();

    feed.publish(Change::Catalog { election_id });
    Ok(Json(Position {
        id: position_id,
        position,
    }))
}

/// Delete a position and its candidates. Refused while votes reference it.
#[delete("/positions/<position_id>")]
async fn delete_position(
    _token: AuthToken<Admin>,
    position_id: Id,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    feed: &State<ChangeFeed>,
) -> Result<()> {
    let position = positions
        .find_one(position_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Position {position_id}")))?;

    let filter = doc! { "position_id": position_id };
    let cast = votes.count_documents(filter.clone(), None).await?;
    if cast > 0 {
        return Err(Error::Conflict(format!(
            "Position {position_id} has {cast} votes and cannot be deleted"
        )));
    }

    candidates.delete_many(filter, None).await?;
    positions.delete_one(position_id.as_doc(), None).await?;

    feed.publish(Change::Catalog {
        election_id: position.election_id,
    });
    Ok(())
}

// ---- Candidate management ----

#[post(
    "/positions/<position_id>/candidates",
    data = "<spec>",
    format = "json"
)]
async fn create_candidate(
    _token: AuthToken<Admin>,
    position_id: Id,
    spec: Json<CandidateSpec>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    new_candidates: Coll<NewCandidate>,
    feed: &State<ChangeFeed>,
) -> Result<Json<Candidate>> {
    let position = positions
        .find_one(position_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Position {position_id}")))?;

    let slate_size = candidates
        .count_documents(doc! { "position_id": position_id }, None)
        .await?;
    if slate_size >= u64::from(position.max_candidates) {
        return Err(Error::Conflict(format!(
            "Position {position_id} already has its maximum of {} candidates",
            position.max_candidates
        )));
    }

    // The election reference comes from the position, so the new candidate
    // cannot be catalog-inconsistent.
    let candidate = spec.0.into_core(&position);
    let candidate_id: Id = new_candidates
        .insert_one(&candidate, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();

    feed.publish(Change::Catalog {
        election_id: position.election_id,
    });
    Ok(Json(Candidate {
        id: candidate_id,
        candidate,
    }))
}

/// Delete a candidate. Refused while votes reference them.
#[delete("/candidates/<candidate_id>")]
async fn delete_candidate(
    _token: AuthToken<Admin>,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    feed: &State<ChangeFeed>,
) -> Result<()> {
    let candidate = candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .ok_or(Error::UnknownCandidate(candidate_id))?;

    let cast = votes
        .count_documents(doc! { "candidate_id": candidate_id }, None)
        .await?;
    if cast > 0 {
        return Err(Error::Conflict(format!(
            "Candidate {candidate_id} has {cast} votes and cannot be deleted"
        )));
    }

    candidates.delete_one(candidate_id.as_doc(), None).await?;
    feed.publish(Change::Catalog {
        election_id: candidate.election_id,
    });
    Ok(())
}
