pub mod auth;
pub mod candidate;
pub mod db;
pub mod election;
pub mod feed;
pub mod ledger;
pub mod mongodb;
pub mod participant;
pub mod position;
pub mod results;
pub mod vote;
