use log::{debug, info, warn};
use machine_learning::{
    arch::{GradientBatch, ModelSnapshot, Mlp},
    optimization::GradientDescent,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{AggregatorHandle, Result};

/// How many requests may wait in an aggregator's mailbox.
pub const MAILBOX_SIZE: usize = 64;

/// A request to the aggregator, answered through its `reply` channel.
#[derive(Debug)]
pub enum Request {
    GetGlobalWeights {
        reply: oneshot::Sender<ModelSnapshot>,
    },
    ApplyGradient {
        batch: GradientBatch,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// The owner of the global model.
///
/// It runs as a single task draining one mailbox, requests are handled one at a time and
/// in arrival order, so a snapshot never observes a half applied gradient.
pub struct Aggregator {
    model: Mlp,
    optimizer: GradientDescent,
    applied: usize,
    rejected: usize,
}

impl Aggregator {
    /// Creates a new `Aggregator`.
    ///
    /// # Arguments
    /// * `model` - The initial global model.
    /// * `optimizer` - The rule used to apply every incoming gradient.
    pub fn new(model: Mlp, optimizer: GradientDescent) -> Self {
        Self {
            model,
            optimizer,
            applied: 0,
            rejected: 0,
        }
    }

    /// Starts the actor in a new task.
    ///
    /// # Returns
    /// A handle to send requests to it and the task's join handle, which resolves with the
    /// final model once every handle is dropped.
    pub fn spawn(self) -> (AggregatorHandle, JoinHandle<Mlp>) {
        let (tx, rx) = mpsc::channel(MAILBOX_SIZE);
        let task = tokio::spawn(self.run(rx));
        (AggregatorHandle::new(tx), task)
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<Request>) -> Mlp {
        info!("aggregator started with sizes {:?}", self.model.sizes());

        while let Some(req) = mailbox.recv().await {
            self.handle(req);
        }

        info!(applied = self.applied, rejected = self.rejected; "aggregator stopped");
        self.model
    }

    fn handle(&mut self, req: Request) {
        match req {
            Request::GetGlobalWeights { reply } => {
                // The requester may have given up waiting, nothing to do then.
                let _ = reply.send(self.model.snapshot());
            }
            Request::ApplyGradient { batch, reply } => {
                let res = self.model.apply_gradient(&batch, &mut self.optimizer);

                match &res {
                    Ok(()) => {
                        self.applied += 1;
                        debug!(batch_size = batch.batch_size, applied = self.applied; "applied gradient");
                    }
                    Err(e) => {
                        self.rejected += 1;
                        warn!("rejected gradient: {e}");
                    }
                }

                let _ = reply.send(res.map_err(Into::into));
            }
        }
    }
}
