//! Background task that keeps the published ranking current.
//!
//! All model state lives on this one task; the rest of the app only ever
//! sends commands and reads the published list. New events are folded in
//! incrementally when the trained model can absorb them, and anything the
//! model cannot absorb falls back to a rebuild from the full history.

use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::db::{Database, Event, TrainingSample};
use crate::prediction::{config::PredictionConfig, features::FeatureVector, model::NameModel};

pub(crate) enum Command {
    /// A new event entered the history.
    Observe(Event),
    /// The history changed shape; rebuild from scratch.
    Refresh,
    /// Build a model only if none exists yet.
    Prime,
    /// Replies once every command queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

pub(crate) type SharedRanking = Arc<RwLock<Option<Vec<String>>>>;
pub(crate) type SharedFix = Arc<Mutex<Option<(f64, f64)>>>;

pub(crate) struct PredictionWorker {
    db: Database,
    config: PredictionConfig,
    ranking: SharedRanking,
    last_fix: SharedFix,
    model: Option<NameModel>,
}

impl PredictionWorker {
    pub(crate) fn new(
        db: Database,
        config: PredictionConfig,
        ranking: SharedRanking,
        last_fix: SharedFix,
    ) -> Self {
        Self {
            db,
            config,
            ranking,
            last_fix,
            model: None,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle(command).await;
                }
            }
        }
        info!("Prediction worker stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Prime => {
                if self.model.is_none() {
                    self.rebuild().await;
                }
            }
            Command::Refresh => self.rebuild().await,
            Command::Observe(event) => self.observe(event).await,
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    async fn observe(&mut self, event: Event) {
        let first_fix = match event.id {
            Some(id) => match self.db.first_track_fix(id).await {
                Ok(fix) => fix,
                Err(err) => {
                    warn!("Failed to read first fix for event {id}: {err:#}");
                    None
                }
            },
            None => None,
        };
        let sample = TrainingSample {
            name: event.name,
            started_at: event.started_at,
            first_fix,
        };

        match self.model.as_mut() {
            None => self.rebuild().await,
            Some(model) => match model.observe(&sample) {
                Ok(()) => self.publish(),
                Err(err) => {
                    debug!("Incremental update rejected ({err}); rebuilding");
                    self.rebuild().await;
                }
            },
        }
    }

    /// Retrains from the full history. On a storage error the previous
    /// model and published ranking stay in place, so readers keep getting
    /// the best list we ever had.
    async fn rebuild(&mut self) {
        match self.db.list_training_samples().await {
            Ok(samples) => {
                debug!("Rebuilding prediction model from {} events", samples.len());
                self.model = Some(NameModel::build(&samples, &self.config));
                self.publish();
            }
            Err(err) => {
                warn!("Prediction rebuild failed, keeping previous ranking: {err:#}");
            }
        }
    }

    fn publish(&self) {
        let Some(model) = self.model.as_ref() else {
            return;
        };
        let fix = *self
            .last_fix
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = FeatureVector::at(Utc::now(), fix);
        let ranking = model.ranking(&now);

        *self
            .ranking
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ranking);
    }
}
