use serde::{Deserialize, Serialize};

use crate::prediction::classifier::ClassifierKind;

/// Tunable knobs for the next-event name prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PredictionConfig {
    /// Names with fewer occurrences than this are listed after the ranked
    /// ones instead of being classified.
    pub min_occurrences: u32,

    /// Which classifier ranks the frequent names.
    pub classifier: ClassifierKind,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            classifier: ClassifierKind::NaiveBayes,
        }
    }
}
