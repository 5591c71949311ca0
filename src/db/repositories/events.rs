use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime},
    models::{Event, TrainingSample},
};

fn row_to_event(row: &Row) -> Result<Event> {
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Event {
        id: row.get("id")?,
        uuid: row.get("uuid")?,
        name: row.get("name")?,
        notes: row.get("notes")?,
        tag: row.get("tag")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
        deleted: row.get("is_deleted")?,
        synced: row.get("is_synced")?,
    })
}

impl Database {
    /// Inserts a new event row and returns its assigned row id.
    pub async fn insert_event(&self, event: &Event) -> Result<i64> {
        let record = event.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO events (uuid, name, notes, tag, started_at, ended_at, updated_at, is_deleted, is_synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.uuid,
                    record.name,
                    record.notes,
                    record.tag,
                    record.started_at.to_rfc3339(),
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.updated_at.to_rfc3339(),
                    record.deleted,
                    record.synced,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Like [`Database::insert_event`], but refuses while any open event
    /// exists. Check and insert run as a single task on the worker thread,
    /// so two racing inserts cannot both get through.
    pub async fn insert_event_exclusive(&self, event: &Event) -> Result<i64> {
        let record = event.clone();
        self.execute(move |conn| {
            let open: Option<String> = conn
                .query_row(
                    "SELECT name FROM events
                     WHERE is_deleted = 0 AND ended_at IS NULL
                     ORDER BY started_at DESC
                     LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(name) = open {
                bail!("event '{name}' is still open");
            }

            conn.execute(
                "INSERT INTO events (uuid, name, notes, tag, started_at, ended_at, updated_at, is_deleted, is_synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.uuid,
                    record.name,
                    record.notes,
                    record.tag,
                    record.started_at.to_rfc3339(),
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.updated_at.to_rfc3339(),
                    record.deleted,
                    record.synced,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Rewrites the editable fields of an existing row. `uuid`, the delete
    /// flag and the sync flag are owned by dedicated operations. Clearing
    /// `ended_at` reopens the event, which is refused while a different
    /// event is open; the check runs in the same worker task as the write.
    pub async fn update_event(&self, event: &Event) -> Result<()> {
        let record = event.clone();
        self.execute(move |conn| {
            let id = record
                .id
                .context("cannot update an event that was never inserted")?;
            if record.ended_at.is_none() {
                let open: Option<String> = conn
                    .query_row(
                        "SELECT name FROM events
                         WHERE is_deleted = 0 AND ended_at IS NULL AND id <> ?1
                         ORDER BY started_at DESC
                         LIMIT 1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(name) = open {
                    bail!("event '{name}' is still open");
                }
            }
            let changed = conn.execute(
                "UPDATE events
                 SET name = ?1,
                     notes = ?2,
                     tag = ?3,
                     started_at = ?4,
                     ended_at = ?5,
                     updated_at = ?6,
                     is_synced = 0
                 WHERE id = ?7",
                params![
                    record.name,
                    record.notes,
                    record.tag,
                    record.started_at.to_rfc3339(),
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.updated_at.to_rfc3339(),
                    id,
                ],
            )?;
            if changed == 0 {
                bail!("event {id} not found");
            }
            Ok(())
        })
        .await
    }

    /// Point lookup by row id. Soft-deleted rows are returned too; callers
    /// that care check the flag.
    pub async fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uuid, name, notes, tag, started_at, ended_at, updated_at, is_deleted, is_synced
                 FROM events
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query(params![event_id])?;
            let event = match rows.next()? {
                Some(row) => Some(row_to_event(row)?),
                None => None,
            };
            Ok(event)
        })
        .await
    }

    /// The most recently started live event, open or closed.
    pub async fn latest_event(&self) -> Result<Option<Event>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uuid, name, notes, tag, started_at, ended_at, updated_at, is_deleted, is_synced
                 FROM events
                 WHERE is_deleted = 0
                 ORDER BY started_at DESC, id DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query([])?;
            let event = match rows.next()? {
                Some(row) => Some(row_to_event(row)?),
                None => None,
            };
            Ok(event)
        })
        .await
    }

    /// Live events starting in `[start, end)`, most recent first.
    pub async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uuid, name, notes, tag, started_at, ended_at, updated_at, is_deleted, is_synced
                 FROM events
                 WHERE is_deleted = 0
                   AND started_at >= ?1
                   AND started_at < ?2
                 ORDER BY started_at DESC, id DESC",
            )?;

            let mut rows = stmt.query(params![start.to_rfc3339(), end.to_rfc3339()])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(row_to_event(row)?);
            }

            Ok(events)
        })
        .await
    }

    /// All live events, most recent first.
    pub async fn list_events(&self) -> Result<Vec<Event>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uuid, name, notes, tag, started_at, ended_at, updated_at, is_deleted, is_synced
                 FROM events
                 WHERE is_deleted = 0
                 ORDER BY started_at DESC, id DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(row_to_event(row)?);
            }

            Ok(events)
        })
        .await
    }

    /// Named live events in chronological order, each joined with the first
    /// GPS fix of its trail. This is the full training corpus for the
    /// prediction model.
    pub async fn list_training_samples(&self) -> Result<Vec<TrainingSample>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.name, e.started_at, tp.latitude AS latitude, tp.longitude AS longitude
                 FROM events e
                 LEFT JOIN track_points tp ON tp.id = (
                     SELECT tp2.id FROM track_points tp2
                     WHERE tp2.event_id = e.id
                     ORDER BY tp2.recorded_at ASC, tp2.id ASC
                     LIMIT 1
                 )
                 WHERE e.is_deleted = 0 AND e.name <> ''
                 ORDER BY e.started_at ASC, e.id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                let started_at: String = row.get("started_at")?;
                let latitude: Option<f64> = row.get("latitude")?;
                let longitude: Option<f64> = row.get("longitude")?;

                samples.push(TrainingSample {
                    name: row.get("name")?,
                    started_at: parse_datetime(&started_at, "started_at")?,
                    first_fix: latitude.zip(longitude),
                });
            }

            Ok(samples)
        })
        .await
    }

    /// Latest event start strictly before `instant`, ignoring deleted rows.
    pub async fn latest_start_before(
        &self,
        instant: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        self.execute(move |conn| {
            let raw: Option<String> = conn.query_row(
                "SELECT MAX(started_at) FROM events
                 WHERE is_deleted = 0 AND started_at < ?1",
                params![instant.to_rfc3339()],
                |row| row.get(0),
            )?;
            parse_optional_datetime(raw, "started_at")
        })
        .await
    }

    /// Earliest event start at or after `instant`, ignoring deleted rows.
    pub async fn earliest_start_since(
        &self,
        instant: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        self.execute(move |conn| {
            let raw: Option<String> = conn.query_row(
                "SELECT MIN(started_at) FROM events
                 WHERE is_deleted = 0 AND started_at >= ?1",
                params![instant.to_rfc3339()],
                |row| row.get(0),
            )?;
            parse_optional_datetime(raw, "started_at")
        })
        .await
    }

    /// Soft delete. The row keeps its trail and stays on disk so the
    /// deletion can still be propagated to the sync server.
    pub async fn mark_event_deleted(&self, event_id: i64, updated_at: DateTime<Utc>) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE events
                 SET is_deleted = 1,
                     is_synced = 0,
                     updated_at = ?2
                 WHERE id = ?1",
                params![event_id, updated_at.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn mark_event_synced(&self, event_id: i64) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE events SET is_synced = 1 WHERE id = ?1",
                params![event_id],
            )?;
            Ok(())
        })
        .await
    }
}
