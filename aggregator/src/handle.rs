use comms::RpcResult;
use machine_learning::arch::{GradientBatch, ModelSnapshot};
use tokio::sync::{mpsc, oneshot};

use crate::{AggregatorErr, AggregatorLink, Request, Result};

/// A cheap, cloneable way of talking to an `Aggregator` living in the same process.
#[derive(Debug, Clone)]
pub struct AggregatorHandle {
    tx: mpsc::Sender<Request>,
}

impl AggregatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<Request>) -> Self {
        Self { tx }
    }

    async fn request<T>(&self, req: Request, rx: oneshot::Receiver<T>) -> Result<T> {
        self.tx.send(req).await.map_err(|_| AggregatorErr::Stopped)?;
        rx.await.map_err(|_| AggregatorErr::Stopped)
    }

    /// Asks for a deep copy of the current global model.
    pub async fn get_global_weights(&self) -> Result<ModelSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::GetGlobalWeights { reply }, rx).await
    }

    /// Applies a gradient to the global model and waits for it to be acknowledged.
    ///
    /// # Arguments
    /// * `batch` - The summed gradient of one mini-batch.
    ///
    /// # Returns
    /// An error if the aggregator stopped or the gradient's shapes don't match the model,
    /// in which case the model is left untouched.
    pub async fn apply_gradient(&self, batch: GradientBatch) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::ApplyGradient { batch, reply }, rx)
            .await?
    }

    /// Whether the aggregator is no longer running.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait::async_trait]
impl AggregatorLink for AggregatorHandle {
    async fn get_global_weights(&mut self) -> RpcResult<ModelSnapshot> {
        Ok(AggregatorHandle::get_global_weights(self).await?)
    }

    async fn apply_gradient(&mut self, batch: GradientBatch) -> RpcResult<()> {
        Ok(AggregatorHandle::apply_gradient(self, batch).await?)
    }
}
