//! The ranked-name model built from event history.
//!
//! Names that recur often enough are handed to the classifier and ranked by
//! probability for the current moment; names seen fewer times are appended
//! after the ranked block in name order, so every known name stays one tap
//! away even before the classifier has evidence for it.

use std::collections::{BTreeMap, BTreeSet};

use crate::db::TrainingSample;
use crate::prediction::{
    classifier::{Classifier, ObserveError},
    config::PredictionConfig,
    features::FeatureVector,
};

pub struct NameModel {
    classifier: Box<dyn Classifier>,
    /// Known names below the occurrence threshold, name-ascending.
    leftovers: Vec<String>,
}

impl NameModel {
    /// Trains a fresh model from the full corpus.
    pub fn build(samples: &[TrainingSample], config: &PredictionConfig) -> Self {
        let mut occurrences: BTreeMap<&str, u32> = BTreeMap::new();
        for sample in samples {
            *occurrences.entry(sample.name.as_str()).or_insert(0) += 1;
        }

        let classified: BTreeSet<&str> = occurrences
            .iter()
            .filter(|(_, &count)| count >= config.min_occurrences)
            .map(|(&name, _)| name)
            .collect();
        let leftovers: Vec<String> = occurrences
            .keys()
            .filter(|name| !classified.contains(*name))
            .map(|name| name.to_string())
            .collect();

        let pairs: Vec<(FeatureVector, String)> = samples
            .iter()
            .filter(|sample| classified.contains(sample.name.as_str()))
            .map(|sample| {
                (
                    FeatureVector::at(sample.started_at, sample.first_fix),
                    sample.name.clone(),
                )
            })
            .collect();

        let mut classifier = config.classifier.build();
        classifier.train(&pairs);

        Self {
            classifier,
            leftovers,
        }
    }

    /// Folds one new sample into the trained classifier. Fails when the
    /// sample falls outside the trained vocabulary or value domains, in
    /// which case the model is unchanged and a rebuild is due.
    pub fn observe(&mut self, sample: &TrainingSample) -> Result<(), ObserveError> {
        let features = FeatureVector::at(sample.started_at, sample.first_fix);
        self.classifier.observe(&features, &sample.name)
    }

    /// Every known name, classified ones first in descending probability
    /// for `now`, then the leftovers. Probability ties break name-ascending
    /// so equal inputs always produce the same list.
    pub fn ranking(&self, now: &FeatureVector) -> Vec<String> {
        let mut scored = self.classifier.distribution(now);
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut names: Vec<String> = scored.into_iter().map(|(name, _)| name).collect();
        names.extend(self.leftovers.iter().cloned());
        names
    }
}
