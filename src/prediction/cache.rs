//! Shared handle around the prediction worker.
//!
//! Reads are a lock-and-clone of the last published ranking and never wait
//! for model work. Writes to the model travel through an unbounded command
//! queue to the single worker task, so they are applied in the order the
//! store saw the underlying mutations.

use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::db::{Database, Event};
use crate::prediction::{
    config::PredictionConfig,
    worker::{Command, PredictionWorker, SharedFix, SharedRanking},
};

struct CacheInner {
    commands: mpsc::UnboundedSender<Command>,
    ranking: SharedRanking,
    last_fix: SharedFix,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct PredictionCache {
    inner: Arc<CacheInner>,
}

impl PredictionCache {
    /// Spawns the worker task. Must be called from within a tokio runtime.
    /// The first ranking appears once something asks for predictions or an
    /// event mutation comes in; until then the worker is idle.
    pub fn start(db: Database, config: PredictionConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let ranking: SharedRanking = Arc::new(RwLock::new(None));
        let last_fix: SharedFix = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let worker = PredictionWorker::new(db, config, ranking.clone(), last_fix.clone());
        let handle = tokio::spawn(worker.run(command_rx, cancel.clone()));

        Self {
            inner: Arc::new(CacheInner {
                commands,
                ranking,
                last_fix,
                cancel,
                worker: Mutex::new(Some(handle)),
            }),
        }
    }

    /// The last published ranking, best guess first. Returns empty and
    /// schedules a build when no model has been produced yet.
    pub fn predictions(&self) -> Vec<String> {
        let guard = self
            .inner
            .ranking
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(names) => names.clone(),
            None => {
                drop(guard);
                let _ = self.inner.commands.send(Command::Prime);
                Vec::new()
            }
        }
    }

    /// Call after a new event was inserted. Unnamed events carry no signal
    /// and are skipped entirely.
    pub fn observe_created(&self, event: &Event) {
        if event.name.is_empty() {
            debug!("Skipping unnamed event for prediction");
            return;
        }
        let _ = self.inner.commands.send(Command::Observe(event.clone()));
    }

    /// Call after an existing event was edited. Edits can change name
    /// counts in ways the incremental path cannot express, so the model is
    /// rebuilt.
    pub fn observe_updated(&self, event: &Event) {
        debug!("Event {} updated, scheduling rebuild", event.uuid);
        let _ = self.inner.commands.send(Command::Refresh);
    }

    /// Call after an event was soft-deleted.
    pub fn observe_deleted(&self, event: &Event) {
        debug!("Event {} deleted, scheduling rebuild", event.uuid);
        let _ = self.inner.commands.send(Command::Refresh);
    }

    /// Remembers the device's most recent GPS fix; the next published
    /// ranking scores against it.
    pub fn note_location(&self, latitude: f64, longitude: f64) {
        *self
            .inner
            .last_fix
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((latitude, longitude));
    }

    /// Resolves once every command queued before the call has been handled.
    pub async fn flush(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.inner.commands.send(Command::Flush(reply_tx)).is_ok() {
            let _ = reply_rx.await;
        }
    }

    /// Stops the worker task. Queued commands may be dropped.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!("Prediction worker task failed: {err}");
            }
        }
    }
}
