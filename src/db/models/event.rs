//! Event data models.
//!
//! An `Event` is one logged activity: a name, free-form notes, an optional
//! tag, a start instant and (once finished) an end instant. An event whose
//! `ended_at` is `None` is open, i.e. still in progress.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Row id, assigned by the store on first insert.
    pub id: Option<i64>,
    /// Stable cross-device identity, assigned at creation.
    pub uuid: String,
    /// May be empty while the user is still typing the name in.
    pub name: String,
    pub notes: String,
    pub tag: Option<String>,
    pub started_at: DateTime<Utc>,
    /// `None` means the event is still in progress.
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag; rows are never removed so sync stays consistent.
    pub deleted: bool,
    /// Set once the sync server has acknowledged this revision.
    pub synced: bool,
}

impl Event {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|ended| ended - self.started_at)
    }
}

/// Caller-supplied fields when creating an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    pub name: String,
    pub notes: String,
    pub tag: Option<String>,
}

impl EventInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One named historical event as consumed by the prediction model build:
/// the name, the start instant, and the first GPS fix of its trail if any.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub first_fix: Option<(f64, f64)>,
}
