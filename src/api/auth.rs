use mongodb::bson::doc;
use rocket::{http::CookieJar, serde::json::Json, Route, State};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    auth::{AuthToken, Voter, AUTH_TOKEN_COOKIE},
    feed::{Change, ChangeFeed},
    mongodb::Coll,
    participant::{Credentials, NewParticipant, Participant, ParticipantDescription},
};

pub fn routes() -> Vec<Route> {
    routes![register, login, logout]
}

/// Create a new pending participant and sign them in.
/// Approval to vote is a separate admin action.
#[post("/auth/register", data = "<credentials>", format = "json")]
async fn register(
    credentials: Json<Credentials>,
    new_participants: Coll<NewParticipant>,
    participants: Coll<Participant>,
    feed: &State<ChangeFeed>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
) -> Result<Json<ParticipantDescription>> {
    let filter = doc! { "username": &credentials.username };
    if participants.find_one(filter.clone(), None).await?.is_some() {
        return Err(Error::BadRequest(format!(
            "Username already in use: {}",
            credentials.username
        )));
    }

    let participant = NewParticipant::register(credentials.0);
    new_participants.insert_one(&participant, None).await?;

    // Read the record back to get its ID.
    let participant = participants
        .find_one(filter, None)
        .await?
        .ok_or_else(|| Error::not_found("Freshly registered participant"))?;

    let token = AuthToken::<Voter>::for_participant(&participant);
    cookies.add(token.into_cookie(config));
    feed.publish(Change::Participants);

    Ok(Json(ParticipantDescription::from(&participant)))
}

/// Sign in with a username and password. The token carries admin rights iff
/// the participant's role is admin.
#[post("/auth/login", data = "<credentials>", format = "json")]
async fn login(
    credentials: Json<Credentials>,
    participants: Coll<Participant>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
) -> Result<Json<ParticipantDescription>> {
    let filter = doc! { "username": &credentials.username };
    let participant = participants
        .find_one(filter, None)
        .await?
        .filter(|p| p.verify_password(&credentials.password))
        .ok_or_else(|| Error::Unauthorized("Incorrect username or password".to_string()))?;

    let token = AuthToken::<Voter>::for_participant(&participant);
    cookies.add(token.into_cookie(config));

    Ok(Json(ParticipantDescription::from(&participant)))
}

#[post("/auth/logout")]
async fn logout(cookies: &CookieJar<'_>) {
    cookies.remove(rocket::http::Cookie::named(AUTH_TOKEN_COOKIE));
}
