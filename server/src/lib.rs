pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod payments;
pub mod routes;
pub mod state;
pub mod store;
pub mod tickets;
pub mod utils;
