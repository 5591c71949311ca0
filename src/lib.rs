//! Core engine for a local-first activity journal.
//!
//! Events are logged with a name, notes, a time range and an optional GPS
//! trail, and live in a single SQLite file owned by [`Database`].
//! [`EventTracker`] is the facade for all lifecycle operations;
//! [`PredictionCache`] keeps a ranked list of likely next event names
//! ready without ever blocking the caller; [`SyncClient`] mirrors
//! revisions to an optional companion server.
//!
//! The crate does no logging setup of its own; embedders install their
//! `log` backend before calling [`init`].

mod db;
mod prediction;
mod settings;
mod sync;
mod tracker;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info, warn};

pub use db::{Database, Event, EventInput, TrackPoint, TrainingSample};
pub use prediction::{
    features::FeatureVector, Classifier, ClassifierKind, NameModel, ObserveError, PredictionCache,
    PredictionConfig,
};
pub use settings::{SettingsStore, SyncSettings};
pub use sync::SyncClient;
pub use tracker::EventTracker;

pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    pub tracker: EventTracker,
}

/// Wires the full engine up from one data directory: the database, the
/// settings file, the prediction worker and (when configured) the sync
/// client. Must be called from within a tokio runtime, since the workers
/// are spawned onto it.
pub fn init(data_dir: PathBuf) -> Result<AppState> {
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("daylog.sqlite3"))?;
    let settings = SettingsStore::new(data_dir.join("settings.json"))?;

    let sync = match settings.sync().base_url {
        Some(url) => match SyncClient::new(url) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!("Sync disabled: {err:#}");
                None
            }
        },
        None => None,
    };

    if let Some(client) = &sync {
        let client = client.clone();
        let device_id = settings.device_id();
        tokio::spawn(async move {
            if let Err(err) = client.register_device(&device_id).await {
                debug!("Device registration deferred: {err:#}");
            }
        });
    }

    let predictions = PredictionCache::start(database.clone(), settings.prediction());
    let tracker = EventTracker::new(database.clone(), predictions, sync);

    info!("daylog engine ready at {}", data_dir.display());

    Ok(AppState {
        db: database,
        settings,
        tracker,
    })
}
