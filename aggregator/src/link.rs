use comms::RpcResult;
use machine_learning::arch::{GradientBatch, ModelSnapshot};

/// The request/reply contract of an aggregator, regardless of where it runs.
///
/// Implemented by `AggregatorHandle` for an in-process actor and by `RemoteAggregator` for
/// one reached through a node.
#[async_trait::async_trait]
pub trait AggregatorLink: Send {
    /// Fetches a deep copy of the global model.
    async fn get_global_weights(&mut self) -> RpcResult<ModelSnapshot>;

    /// Sends a gradient and waits for its acknowledgement.
    ///
    /// # Returns
    /// `RpcErr::ShapeMismatch` if the aggregator rejected the gradient.
    async fn apply_gradient(&mut self, batch: GradientBatch) -> RpcResult<()>;
}
