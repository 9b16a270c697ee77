mod admin;
mod auth;
mod elections;
mod results;
mod voting;

use rocket::Route;

/// All routes, mounted at the root.
pub fn routes() -> Vec<Route> {
    [
        admin::routes(),
        auth::routes(),
        elections::routes(),
        results::routes(),
        voting::routes(),
    ]
    .concat()
}
