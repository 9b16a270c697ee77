#[macro_use]
extern crate rocket;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

use rocket::{Build, Rocket};

use config::{ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;
use model::feed::ChangeFeed;

/// Assemble the server: config, database, logging, the change feed, and all
/// routes. Ignition performs the database setup (indexes, admin seed).
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(LoggerFairing)
        .manage(ChangeFeed::new())
        .mount("/", api::routes())
}
