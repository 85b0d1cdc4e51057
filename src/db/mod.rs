//! SQLite-backed store for raw telemetry and recommendation records.

pub mod connection;
pub mod helpers;
mod migrations;
pub mod models;
pub mod repositories;

pub use connection::Database;
pub use models::*;
pub use repositories::UpsertOutcome;
