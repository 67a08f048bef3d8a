// The server binary and the integration tests both build on these modules.

pub mod auth;
pub mod comments;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod extractors;
pub mod notify;
pub mod posts;
pub mod routes;
pub mod state;
