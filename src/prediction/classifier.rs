//! Pluggable classifiers that rank event names by likelihood.
//!
//! The classifier sees one labelled sample per named historical event and
//! answers "given it is 2pm on a Tuesday near this grid cell, which name
//! comes next?". Counts are kept in B-tree maps so iteration order, and
//! with it tie-breaking, is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prediction::features::{fixed_domain, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// Why an observation could not be folded into a trained model. The caller
/// reacts by rebuilding from the full history.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObserveError {
    #[error("name '{0}' is not in the trained vocabulary")]
    UnknownName(String),
    #[error("{feature} value {value} was never seen in training")]
    UnknownValue { feature: &'static str, value: i32 },
}

pub trait Classifier: Send {
    /// Rebuilds all internal state from the given corpus.
    fn train(&mut self, samples: &[(FeatureVector, String)]);

    /// Folds one labelled sample into the trained state. Fails without
    /// changing anything when the sample lies outside what training saw.
    fn observe(&mut self, features: &FeatureVector, name: &str) -> Result<(), ObserveError>;

    /// Probability per known name for the given feature vector. Order is
    /// unspecified; probabilities sum to 1 unless the model is empty.
    fn distribution(&self, features: &FeatureVector) -> Vec<(String, f64)>;

    fn is_empty(&self) -> bool;
}

/// Which concrete classifier to rank with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassifierKind {
    NaiveBayes,
    Frequency,
}

impl ClassifierKind {
    pub fn build(&self) -> Box<dyn Classifier> {
        match self {
            ClassifierKind::NaiveBayes => Box::new(NaiveBayes::new()),
            ClassifierKind::Frequency => Box::new(FrequencyRank::new()),
        }
    }
}

/// Categorical naive Bayes over the feature slots, Laplace-smoothed.
///
/// Per slot it tracks the set of observed values (the clock slots start with
/// their full 0-23 / 0-6 ranges) and a count per (value, name) pair. Scoring
/// runs in log space and exp-normalizes at the end.
#[derive(Debug, Default)]
pub struct NaiveBayes {
    class_counts: BTreeMap<String, u32>,
    total: u32,
    domains: [BTreeSet<i32>; FEATURE_COUNT],
    value_counts: [BTreeMap<i32, BTreeMap<String, u32>>; FEATURE_COUNT],
}

impl NaiveBayes {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self, slot: usize, value: i32, name: &str) {
        self.domains[slot].insert(value);
        *self.value_counts[slot]
            .entry(value)
            .or_default()
            .entry(name.to_string())
            .or_insert(0) += 1;
    }

    fn count_sample(&mut self, features: &FeatureVector, name: &str) {
        *self.class_counts.entry(name.to_string()).or_insert(0) += 1;
        self.total += 1;
        for (slot, value) in features.slots().into_iter().enumerate() {
            if let Some(value) = value {
                self.bump(slot, value, name);
            }
        }
    }
}

impl Classifier for NaiveBayes {
    fn train(&mut self, samples: &[(FeatureVector, String)]) {
        self.class_counts.clear();
        self.total = 0;
        for slot in 0..FEATURE_COUNT {
            self.value_counts[slot].clear();
            self.domains[slot] = match fixed_domain(slot) {
                Some(range) => range.collect(),
                None => BTreeSet::new(),
            };
        }

        for (features, name) in samples {
            self.count_sample(features, name);
        }
    }

    fn observe(&mut self, features: &FeatureVector, name: &str) -> Result<(), ObserveError> {
        if !self.class_counts.contains_key(name) {
            return Err(ObserveError::UnknownName(name.to_string()));
        }
        for (slot, value) in features.slots().into_iter().enumerate() {
            if let Some(value) = value {
                if !self.domains[slot].contains(&value) {
                    return Err(ObserveError::UnknownValue {
                        feature: FEATURE_NAMES[slot],
                        value,
                    });
                }
            }
        }

        // validated above, so the counts stay consistent on the error path
        self.count_sample(features, name);
        Ok(())
    }

    fn distribution(&self, features: &FeatureVector) -> Vec<(String, f64)> {
        if self.total == 0 {
            return Vec::new();
        }

        let slots = features.slots();
        let mut scored: Vec<(String, f64)> = Vec::with_capacity(self.class_counts.len());

        for (name, &count) in &self.class_counts {
            let mut log_prob = (count as f64 / self.total as f64).ln();

            for (slot, value) in slots.into_iter().enumerate() {
                let Some(value) = value else { continue };
                let domain_size = self.domains[slot].len();
                if domain_size == 0 {
                    // no training event carried this slot; it tells us nothing
                    continue;
                }
                let seen = self.value_counts[slot]
                    .get(&value)
                    .and_then(|per_name| per_name.get(name))
                    .copied()
                    .unwrap_or(0);
                let likelihood = (seen as f64 + 1.0) / (count as f64 + domain_size as f64);
                log_prob += likelihood.ln();
            }

            scored.push((name.clone(), log_prob));
        }

        let max_log = scored
            .iter()
            .map(|(_, lp)| *lp)
            .fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for (_, lp) in &mut scored {
            *lp = (*lp - max_log).exp();
            sum += *lp;
        }
        if sum > 0.0 {
            for (_, p) in &mut scored {
                *p /= sum;
            }
        }

        scored
    }

    fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Baseline that ranks purely by how often each name occurred. The feature
/// vector is ignored.
#[derive(Debug, Default)]
pub struct FrequencyRank {
    counts: BTreeMap<String, u32>,
    total: u32,
}

impl FrequencyRank {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Classifier for FrequencyRank {
    fn train(&mut self, samples: &[(FeatureVector, String)]) {
        self.counts.clear();
        self.total = 0;
        for (_, name) in samples {
            *self.counts.entry(name.clone()).or_insert(0) += 1;
            self.total += 1;
        }
    }

    fn observe(&mut self, _features: &FeatureVector, name: &str) -> Result<(), ObserveError> {
        match self.counts.get_mut(name) {
            Some(count) => {
                *count += 1;
                self.total += 1;
                Ok(())
            }
            None => Err(ObserveError::UnknownName(name.to_string())),
        }
    }

    fn distribution(&self, _features: &FeatureVector) -> Vec<(String, f64)> {
        if self.total == 0 {
            return Vec::new();
        }
        self.counts
            .iter()
            .map(|(name, &count)| (name.clone(), count as f64 / self.total as f64))
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.total == 0
    }
}
