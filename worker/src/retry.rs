use std::time::Duration;

use comms::RpcErr;
use log::warn;
use serde::{Deserialize, Serialize};
use tokio::time;

use crate::{Result, WorkerErr, config::millis};

/// Bounded retries with exponential backoff for retryable RPC failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// The total amount of attempts, the first one included.
    pub max_attempts: u32,
    #[serde(rename = "initial_backoff_ms", with = "millis")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms", with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Returns how long to wait after the failed attempt number `attempt`, counting from 0.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Decides what to do after a failed attempt.
    ///
    /// Sleeps for the backoff and bumps `attempt` when `err` is retryable and there are
    /// attempts left.
    ///
    /// # Arguments
    /// * `attempt` - The amount of failed attempts so far.
    /// * `what` - The operation that failed, for logs and the final error.
    /// * `err` - The failure.
    ///
    /// # Returns
    /// `Ok(())` if the caller should try again, the final error otherwise.
    pub async fn wait(&self, attempt: &mut u32, what: &'static str, err: RpcErr) -> Result<()> {
        if !err.is_retryable() || *attempt + 1 >= self.max_attempts {
            return Err(WorkerErr::Rpc { what, source: err });
        }

        let wait = self.backoff(*attempt);
        *attempt += 1;
        warn!(attempt = *attempt; "{what} failed: {err}, retrying in {wait:?}");
        time::sleep(wait).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn gives_up_after_the_last_attempt() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        let mut attempt = 0;

        let unavailable = || RpcErr::Unavailable("down".into());
        assert!(policy.wait(&mut attempt, "lookup", unavailable()).await.is_ok());
        assert!(matches!(
            policy.wait(&mut attempt, "lookup", unavailable()).await,
            Err(WorkerErr::Rpc { what: "lookup", .. })
        ));
    }

    #[tokio::test]
    async fn shape_mismatch_is_never_retried() {
        let policy = RetryPolicy::default();
        let mut attempt = 0;

        let err = RpcErr::ShapeMismatch("layer 0".into());
        assert!(policy.wait(&mut attempt, "weights", err).await.is_err());
        assert_eq!(attempt, 0);
    }
}
