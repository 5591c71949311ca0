pub mod cache;
pub mod classifier;
pub mod config;
pub mod features;
pub mod model;
mod worker;

pub use cache::PredictionCache;
pub use classifier::{Classifier, ClassifierKind, ObserveError};
pub use config::PredictionConfig;
pub use model::NameModel;
