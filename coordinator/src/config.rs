use std::{fs, path::{Path, PathBuf}, sync::Arc};

use serde::{Deserialize, Serialize};
use worker::TrainingConfig;

use crate::{
    CoordinatorErr, Result,
    source::{CsvSource, FeatureSource, InlineSource},
};

/// Where a session's labeled features come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetConfig {
    /// A numeric CSV table, the last column holds the label.
    Csv { path: PathBuf },
    Inline {
        rows: Vec<Vec<f64>>,
        labels: Vec<f64>,
    },
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self::Csv {
            path: PathBuf::from("data/features.csv"),
        }
    }
}

impl DatasetConfig {
    /// Builds the feature source this configuration describes.
    pub fn source(&self) -> Result<Arc<dyn FeatureSource>> {
        let source: Arc<dyn FeatureSource> = match self {
            Self::Csv { path } => Arc::new(CsvSource::new(path)),
            Self::Inline { rows, labels } => {
                Arc::new(InlineSource::from_rows(rows.clone(), labels.clone())?)
            }
        };

        Ok(source)
    }
}

/// Everything a session needs besides the aggregator's address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub training: TrainingConfig,
    pub dataset: DatasetConfig,
    /// The fraction of rows used for training, the rest is kept for validation.
    pub split_ratio: f64,
    /// Seeds the shuffle before splitting.
    pub seed: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            training: TrainingConfig::default(),
            dataset: DatasetConfig::default(),
            split_ratio: 0.7,
            seed: 42,
        }
    }
}

impl SessionConfig {
    /// Reads a JSON configuration, missing fields take their default values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read(path)?;
        let config: Self = serde_json::from_slice(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values serde can't.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.split_ratio) {
            return Err(CoordinatorErr::InvalidConfig(format!(
                "split_ratio must be within [0, 1], got {}",
                self.split_ratio
            )));
        }

        if self.training.epochs == 0 {
            return Err(CoordinatorErr::InvalidConfig(
                "epochs must be at least 1".to_string(),
            ));
        }

        if self.training.hidden_layers.contains(&0) {
            return Err(CoordinatorErr::InvalidConfig(format!(
                "hidden layers can't be empty, got {:?}",
                self.training.hidden_layers
            )));
        }

        if self.training.retry.max_attempts == 0 {
            return Err(CoordinatorErr::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_training_recipe() {
        let config = SessionConfig::default();
        assert_eq!(config.split_ratio, 0.7);
        assert_eq!(config.seed, 42);
        assert_eq!(config.training.epochs, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_an_inline_dataset() {
        let json = r#"{
            "seed": 7,
            "training": { "epochs": 2, "batch_size": 4 },
            "dataset": { "kind": "inline", "rows": [[0.0, 1.0], [1.0, 0.0]], "labels": [1.0, 0.0] }
        }"#;

        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.training.batch_size.get(), 4);
        assert_eq!(config.split_ratio, 0.7);

        let dataset = config.dataset.source().unwrap().load().unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.width(), 2);
    }

    #[test]
    fn rejects_ratio_out_of_range() {
        let config = SessionConfig {
            split_ratio: 1.2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CoordinatorErr::InvalidConfig(_))
        ));
    }
}
