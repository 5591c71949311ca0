//! The lifecycle facade the rest of the app talks to.
//!
//! Every mutation goes through here so the three collaborators stay in
//! step: the store is written first, then the prediction cache is told
//! what changed, then the revision is pushed to the sync server in the
//! background. Readers go straight to the store.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use log::{debug, warn};
use uuid::Uuid;

use crate::db::{Database, Event, EventInput, TrackPoint};
use crate::prediction::PredictionCache;
use crate::sync::SyncClient;

#[derive(Clone)]
pub struct EventTracker {
    db: Database,
    predictions: PredictionCache,
    sync: Option<SyncClient>,
}

impl EventTracker {
    pub fn new(db: Database, predictions: PredictionCache, sync: Option<SyncClient>) -> Self {
        Self {
            db,
            predictions,
            sync,
        }
    }

    /// The event currently in progress: the most recently started live
    /// event, but only while it has no end time yet.
    pub async fn current_event(&self) -> Result<Option<Event>> {
        let latest = self.db.latest_event().await?;
        Ok(latest.filter(|event| event.is_open()))
    }

    /// Opens a new event starting now. Fails while another event is open;
    /// switching activities means closing the old one first.
    pub async fn start_event(&self, input: EventInput) -> Result<Event> {
        self.create_event(input, Utc::now(), None).await
    }

    /// Persists a new event with explicit times. Passing no end time opens
    /// the event, which is refused while another open event exists.
    pub async fn create_event(
        &self,
        input: EventInput,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Event> {
        if let Some(end) = ended_at {
            if end < started_at {
                bail!("event cannot end before it starts");
            }
        }

        let mut event = Event {
            id: None,
            uuid: Uuid::new_v4().to_string(),
            name: input.name,
            notes: input.notes,
            tag: input.tag,
            started_at,
            ended_at,
            updated_at: Utc::now(),
            deleted: false,
            synced: false,
        };

        let id = if event.ended_at.is_none() {
            self.db.insert_event_exclusive(&event).await?
        } else {
            self.db.insert_event(&event).await?
        };
        event.id = Some(id);
        debug!("Created event {id} '{}'", event.name);

        self.predictions.observe_created(&event);
        self.push_event(&event);
        Ok(event)
    }

    /// Upserts an edited event. `None` is accepted and does nothing, so
    /// callers can hand over an optional draft without unwrapping it. An
    /// event without a row id is inserted and comes back with one.
    pub async fn save_event(&self, event: Option<Event>) -> Result<Option<Event>> {
        let Some(mut event) = event else {
            debug!("save_event called with nothing to save");
            return Ok(None);
        };

        event.updated_at = Utc::now();
        match event.id {
            Some(_) => {
                self.db.update_event(&event).await?;
                self.predictions.observe_updated(&event);
            }
            None => {
                if event.uuid.is_empty() {
                    event.uuid = Uuid::new_v4().to_string();
                }
                let id = if event.ended_at.is_none() {
                    self.db.insert_event_exclusive(&event).await?
                } else {
                    self.db.insert_event(&event).await?
                };
                event.id = Some(id);
                self.predictions.observe_created(&event);
            }
        }

        self.push_event(&event);
        Ok(Some(event))
    }

    /// Closes the open event at `ended_at` and returns it. Returns `None`
    /// when nothing is open; closing twice is not an error.
    pub async fn close_current(&self, ended_at: DateTime<Utc>) -> Result<Option<Event>> {
        let Some(mut open) = self.current_event().await? else {
            debug!("No open event to close");
            return Ok(None);
        };
        if ended_at < open.started_at {
            bail!("event cannot end before it starts");
        }

        open.ended_at = Some(ended_at);
        open.updated_at = Utc::now();
        self.db.update_event(&open).await?;
        debug!("Closed event '{}'", open.name);

        self.predictions.observe_updated(&open);
        self.push_event(&open);
        Ok(Some(open))
    }

    /// Events that started on the given local calendar day, most recent
    /// first. The day runs from local midnight to the next local midnight.
    pub async fn events_for_day(&self, day: NaiveDate) -> Result<Vec<Event>> {
        let (start, end) = local_day_bounds(day)?;
        self.db.events_between(start, end).await
    }

    /// The closest earlier local day that has at least one event.
    pub async fn previous_event_day(&self, day: NaiveDate) -> Result<Option<NaiveDate>> {
        let (start, _) = local_day_bounds(day)?;
        let earlier = self.db.latest_start_before(start).await?;
        Ok(earlier.map(|instant| instant.with_timezone(&Local).date_naive()))
    }

    /// The closest later local day that has at least one event.
    pub async fn next_event_day(&self, day: NaiveDate) -> Result<Option<NaiveDate>> {
        let (_, end) = local_day_bounds(day)?;
        let later = self.db.earliest_start_since(end).await?;
        Ok(later.map(|instant| instant.with_timezone(&Local).date_naive()))
    }

    /// Full history, most recent first.
    pub async fn all_events(&self) -> Result<Vec<Event>> {
        self.db.list_events().await
    }

    pub async fn event(&self, event_id: i64) -> Result<Option<Event>> {
        self.db.get_event(event_id).await
    }

    /// Soft-deletes an event. Unknown ids and repeated deletes are quietly
    /// accepted; the end state is the same.
    pub async fn delete_event(&self, event_id: i64) -> Result<()> {
        let Some(event) = self.db.get_event(event_id).await? else {
            debug!("Delete of unknown event {event_id} ignored");
            return Ok(());
        };
        if event.deleted {
            return Ok(());
        }

        self.db.mark_event_deleted(event_id, Utc::now()).await?;
        debug!("Deleted event {event_id} '{}'", event.name);

        self.predictions.observe_deleted(&event);
        self.push_deletion(&event);
        Ok(())
    }

    /// Appends a GPS fix to the given event's trail. Returns `false` when
    /// the event is gone or deleted; a stale fix is not an error.
    pub async fn append_location(
        &self,
        event_id: i64,
        latitude: f64,
        longitude: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.predictions.note_location(latitude, longitude);
        let appended = self
            .db
            .append_track_point(event_id, latitude, longitude, recorded_at)
            .await?;
        if !appended {
            debug!("GPS fix for missing event {event_id} dropped");
        }
        Ok(appended)
    }

    /// Attaches a GPS fix to whatever event is currently open and returns
    /// its id, or `None` when nothing is open.
    pub async fn record_location(
        &self,
        latitude: f64,
        longitude: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        self.predictions.note_location(latitude, longitude);

        let Some(open) = self.current_event().await? else {
            debug!("GPS fix with no open event dropped");
            return Ok(None);
        };
        let event_id = open.id.context("open event has no row id")?;

        let appended = self
            .db
            .append_track_point(event_id, latitude, longitude, recorded_at)
            .await?;
        Ok(appended.then_some(event_id))
    }

    /// The recorded trail for an event, oldest fix first. Soft-deleted
    /// events keep their trails.
    pub async fn track_for_event(&self, event_id: i64) -> Result<Vec<TrackPoint>> {
        self.db.track_points_for_event(event_id).await
    }

    /// Ranked name suggestions for an event starting now.
    pub fn predictions(&self) -> Vec<String> {
        self.predictions.predictions()
    }

    /// Flags an event revision as acknowledged by the sync server.
    pub async fn mark_synced(&self, event_id: i64) -> Result<()> {
        self.db.mark_event_synced(event_id).await
    }

    /// Stops the prediction worker. The store handle shuts its own worker
    /// down when the last clone drops.
    pub async fn shutdown(&self) {
        self.predictions.shutdown().await;
    }

    fn push_event(&self, event: &Event) {
        let Some(sync) = self.sync.clone() else {
            return;
        };
        let Some(event_id) = event.id else { return };
        let db = self.db.clone();
        let event = event.clone();

        tokio::spawn(async move {
            let track = match db.track_points_for_event(event_id).await {
                Ok(points) => points,
                Err(err) => {
                    warn!("Failed to load trail for upload: {err:#}");
                    Vec::new()
                }
            };
            match sync.push_event(&event, &track).await {
                Ok(()) => {
                    if let Err(err) = db.mark_event_synced(event_id).await {
                        warn!("Failed to flag event {event_id} synced: {err:#}");
                    }
                }
                Err(err) => debug!("Event upload deferred: {err:#}"),
            }
        });
    }

    fn push_deletion(&self, event: &Event) {
        let Some(sync) = self.sync.clone() else {
            return;
        };
        let db = self.db.clone();
        let uuid = event.uuid.clone();
        let event_id = event.id;

        tokio::spawn(async move {
            match sync.push_deletion(&uuid).await {
                Ok(()) => {
                    if let Some(id) = event_id {
                        if let Err(err) = db.mark_event_synced(id).await {
                            warn!("Failed to flag event {id} synced: {err:#}");
                        }
                    }
                }
                Err(err) => debug!("Deletion upload deferred: {err:#}"),
            }
        });
    }
}

/// UTC bounds of a local calendar day, `[midnight, next midnight)`.
fn local_day_bounds(day: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let next = day.succ_opt().context("day out of range")?;
    Ok((local_midnight(day)?, local_midnight(next)?))
}

fn local_midnight(day: NaiveDate) -> Result<DateTime<Utc>> {
    let naive = day.and_hms_opt(0, 0, 0).context("invalid time of day")?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("no valid local midnight on {day}"))?;
    Ok(local.with_timezone(&Utc))
}
