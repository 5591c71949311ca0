//! Persistent store for events and their GPS trails.
//!
//! One SQLite file, owned by a dedicated worker thread ([`connection`]),
//! with table-specific query methods split across [`repositories`].

pub(crate) mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{Event, EventInput, TrackPoint, TrainingSample};
