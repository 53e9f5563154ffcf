use comms::{ActorAddr, RpcResult};
use machine_learning::metrics::Scores;

use crate::TrainReport;

/// What a worker or an evaluator needs from whoever spawned it.
#[async_trait::async_trait]
pub trait Parent: Send + Sync {
    /// Looks up the address of the session's aggregator.
    ///
    /// # Returns
    /// A retryable error while the address isn't known yet.
    async fn aggregator_addr(&self) -> RpcResult<ActorAddr>;

    /// Notifies that every epoch went through.
    async fn training_finished(&self, report: TrainReport);

    /// Notifies the scores of an evaluation pass.
    async fn evaluation_finished(&self, scores: Scores);

    /// Notifies a failure the child can't recover from.
    async fn failed(&self, reason: String);
}
