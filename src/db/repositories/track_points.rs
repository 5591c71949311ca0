use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{connection::Database, helpers::parse_datetime, models::TrackPoint};

fn row_to_track_point(row: &Row) -> Result<TrackPoint> {
    let recorded_at: String = row.get("recorded_at")?;

    Ok(TrackPoint {
        id: row.get("id")?,
        event_id: row.get("event_id")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        recorded_at: parse_datetime(&recorded_at, "recorded_at")?,
    })
}

impl Database {
    /// Appends a GPS fix to an event's trail. Returns `false` without
    /// inserting when the event does not exist or is soft-deleted; a stale
    /// fix arriving after a delete is not an error.
    pub async fn append_track_point(
        &self,
        event_id: i64,
        latitude: f64,
        longitude: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.execute(move |conn| {
            let deleted: Option<bool> = conn
                .query_row(
                    "SELECT is_deleted FROM events WHERE id = ?1",
                    params![event_id],
                    |row| row.get(0),
                )
                .optional()?;

            match deleted {
                Some(false) => {
                    conn.execute(
                        "INSERT INTO track_points (event_id, latitude, longitude, recorded_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![event_id, latitude, longitude, recorded_at.to_rfc3339()],
                    )?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
        .await
    }

    /// Full trail for an event in recording order. Works for soft-deleted
    /// events too, since their trails stay on disk.
    pub async fn track_points_for_event(&self, event_id: i64) -> Result<Vec<TrackPoint>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_id, latitude, longitude, recorded_at
                 FROM track_points
                 WHERE event_id = ?1
                 ORDER BY recorded_at ASC, id ASC",
            )?;

            let mut rows = stmt.query(params![event_id])?;
            let mut points = Vec::new();
            while let Some(row) = rows.next()? {
                points.push(row_to_track_point(row)?);
            }

            Ok(points)
        })
        .await
    }

    /// First fix of an event's trail, if it has one.
    pub async fn first_track_fix(&self, event_id: i64) -> Result<Option<(f64, f64)>> {
        self.execute(move |conn| {
            let fix = conn
                .query_row(
                    "SELECT latitude, longitude FROM track_points
                     WHERE event_id = ?1
                     ORDER BY recorded_at ASC, id ASC
                     LIMIT 1",
                    params![event_id],
                    |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
                )
                .optional()?;
            Ok(fix)
        })
        .await
    }
}
