use std::path::{Path, PathBuf};

use machine_learning::{Result, dataset::Dataset};

/// Produces a session's labeled feature table.
///
/// Loading is blocking and may be slow, callers run it off the async executor.
pub trait FeatureSource: Send + Sync {
    fn load(&self) -> Result<Dataset>;
}

/// Reads the features from a numeric CSV table.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl FeatureSource for CsvSource {
    fn load(&self) -> Result<Dataset> {
        Dataset::from_csv(&self.path)
    }
}

/// Serves an in-memory table.
#[derive(Debug, Clone)]
pub struct InlineSource {
    dataset: Dataset,
}

impl InlineSource {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    /// Builds the table out of its rows and labels.
    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<Self> {
        Ok(Self::new(Dataset::from_rows(rows, labels)?))
    }
}

impl FeatureSource for InlineSource {
    fn load(&self) -> Result<Dataset> {
        Ok(self.dataset.clone())
    }
}
