use chrono::{Duration, Utc};
use log::{error, info};
use mongodb::{bson::doc, error::Error as DbError, Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    mongodb::{ensure_indexes_exist, Coll},
    participant::{Credentials, Participant, ParticipantCore, Role},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    default_admin_username: String,
    // secrets
    jwt_secret: String,
    default_admin_password: String,
}

impl Config {
    /// Valid lifetime of auth token cookies.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Credentials of the admin account seeded at first launch.
    pub fn default_admin(&self) -> Credentials {
        Credentials {
            username: self.default_admin_username.clone(),
            password: self.default_admin_password.clone(),
        }
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist; the vote uniqueness constraint
        // lives here, so launch must not proceed without it.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to set up database indexes: {e}");
            return Err(rocket);
        }

        // Ensure there is at least one admin account.
        let app_config = rocket
            .state::<Config>()
            .expect("ConfigFairing must be attached before DatabaseFairing");
        if let Err(e) = ensure_admin_exists(&db, app_config).await {
            error!("Failed to seed the default admin: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Seed the default admin account if no admin exists yet.
async fn ensure_admin_exists(db: &Database, config: &Config) -> Result<(), DbError> {
    let participants = Coll::<Participant>::from_db(db);
    let existing = participants
        .find_one(doc! { "role": "admin" }, None)
        .await?;
    if existing.is_none() {
        let mut admin = ParticipantCore::register(config.default_admin());
        admin.set_role(Role::Admin, Utc::now());
        Coll::<ParticipantCore>::from_db(db)
            .insert_one(admin, None)
            .await?;
        info!(
            "Seeded default admin account \"{}\"",
            config.default_admin_username
        );
    }
    Ok(())
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "ballotbox".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self {
                auth_ttl: 86400,
                default_admin_username: "coordinator".to_string(),
                jwt_secret: "test-jwt-secret-do-not-use-in-production".to_string(),
                default_admin_password: "coordinator".to_string(),
            }
        }
    }
}
