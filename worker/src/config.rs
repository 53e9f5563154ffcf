use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};

use crate::RetryPolicy;

/// Serializes a `Duration` as a whole amount of milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(31);

/// How a worker trains and how long it waits on its peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: NonZeroUsize,
    /// The widths of the hidden layers, the input width comes from the dataset and there's
    /// always a single output.
    pub hidden_layers: Vec<usize>,
    /// The bounded wait for the coordinator to answer an address lookup.
    #[serde(rename = "lookup_timeout_ms", with = "millis")]
    pub lookup_timeout: Duration,
    /// The bounded wait for every aggregator request.
    #[serde(rename = "rpc_timeout_ms", with = "millis")]
    pub rpc_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 25,
            batch_size: DEFAULT_BATCH_SIZE,
            hidden_layers: vec![15, 8],
            lookup_timeout: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
        }
    }
}

impl TrainingConfig {
    /// Returns the full architecture of a model fed with `features` inputs.
    pub fn architecture(&self, features: usize) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_layers.len() + 2);
        sizes.push(features);
        sizes.extend(&self.hidden_layers);
        sizes.push(1);
        sizes
    }
}
