use serde::{Deserialize, Serialize};

/// Column order the bundled model was trained with.
pub const DEFAULT_FEATURE_COLUMNS: [&str; 12] = [
    "cbg",
    "glucose_change",
    "glucose_acceleration",
    "glucose_rolling_mean_1h",
    "glucose_rolling_std_1h",
    "basal",
    "bolus",
    "carbInput",
    "insulin_on_board",
    "carbs_on_board",
    "hr",
    "gsr",
];

/// Ordered feature columns expected by a trained model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURE_COLUMNS.iter().map(|name| name.to_string()).collect())
    }
}
