//! Track point data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single GPS fix on an event's trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub id: Option<i64>,
    pub event_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}
