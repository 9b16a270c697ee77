use chrono::Utc;
use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, serde::json::Json, Route};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    candidate::Candidate,
    election::{Election, ElectionDescription},
    mongodb::{Coll, Id},
    position::Position,
};

pub fn routes() -> Vec<Route> {
    routes![get_elections, get_election]
}

/// All elections, each stamped with its lifecycle state as of right now.
#[get("/elections")]
async fn get_elections(elections: Coll<Election>) -> Result<Json<Vec<ElectionDescription>>> {
    let now = Utc::now();
    let all: Vec<Election> = elections.find(None, None).await?.try_collect().await?;
    let described = all
        .iter()
        .map(|election| ElectionDescription::new(election, now))
        .collect();
    Ok(Json(described))
}

/// One election with its positions and their candidate slates.
#[get("/elections/<election_id>")]
async fn get_election(
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
) -> Result<Json<ElectionDetail>> {
    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or(Error::UnknownElection(election_id))?;

    let filter = doc! { "election_id": election_id };
    let positions: Vec<Position> = positions
        .find(filter.clone(), None)
        .await?
        .try_collect()
        .await?;
    let candidates: Vec<Candidate> = candidates.find(filter, None).await?.try_collect().await?;

    let positions = positions
        .into_iter()
        .map(|position| {
            let slate = candidates
                .iter()
                .filter(|c| c.position_id == position.id)
                .map(CandidateDetail::from)
                .collect();
            PositionDetail {
                id: position.id,
                title: position.position.title,
                max_candidates: position.position.max_candidates,
                candidates: slate,
            }
        })
        .collect();

    Ok(Json(ElectionDetail {
        election: ElectionDescription::new(&election, Utc::now()),
        positions,
    }))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDetail {
    #[serde(flatten)]
    pub election: ElectionDescription,
    pub positions: Vec<PositionDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDetail {
    pub id: Id,
    pub title: String,
    pub max_candidates: u32,
    pub candidates: Vec<CandidateDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDetail {
    pub id: Id,
    pub name: String,
    pub party: String,
}

impl From<&Candidate> for CandidateDetail {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name.clone(),
            party: candidate.party.clone(),
        }
    }
}
