use std::sync::Arc;

use log::{debug, error, info, warn};
use machine_learning::{
    arch::Mlp,
    dataset::Dataset,
    metrics::Scores,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    AggregatorClient, Connector, Delivery, Parent, Result, TrainingConfig, WorkerErr,
};

/// The lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Done,
}

/// What a worker reports once it's done training.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Every gradient sent, confirmed or not.
    pub batches_sent: usize,
    /// How many of those were never acknowledged.
    pub unconfirmed: usize,
    /// The final global model's scores over the validation split, if it had rows.
    pub scores: Option<Scores>,
}

#[derive(Debug)]
enum Msg {
    Train { train: Dataset, validation: Dataset },
}

/// A way of handing data to a running `Worker`.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Msg>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    /// Starts training with the given splits.
    ///
    /// # Arguments
    /// * `train` - The rows gradients are computed over.
    /// * `validation` - The rows the final model is scored against.
    pub async fn train(&self, train: Dataset, validation: Dataset) -> Result<()> {
        self.tx
            .send(Msg::Train { train, validation })
            .await
            .map_err(|_| WorkerErr::Stopped)
    }

    /// Returns the worker's current state.
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }
}

/// Computes gradients over its local training split against the latest global model.
///
/// For every mini-batch it fetches a fresh snapshot, runs a backward pass and sends the
/// summed gradient to the aggregator. Batches are walked in their stored order.
pub struct Worker {
    id: String,
    config: TrainingConfig,
    client: AggregatorClient,
    parent: Arc<dyn Parent>,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    /// Creates a new `Worker`.
    ///
    /// # Arguments
    /// * `id` - Identifier used for observability.
    /// * `config` - The training configuration.
    /// * `parent` - Answers lookups and receives the final report.
    /// * `connector` - Opens links to the aggregator.
    pub fn new(
        id: impl Into<String>,
        config: TrainingConfig,
        parent: Arc<dyn Parent>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let client = AggregatorClient::new(
            Arc::clone(&parent),
            connector,
            config.lookup_timeout,
            config.rpc_timeout,
            config.retry.clone(),
        );

        Self {
            id: id.into(),
            config,
            client,
            parent,
            state: watch::Sender::new(WorkerState::Idle),
        }
    }

    /// Starts the worker in a new task, it waits for its data and then trains.
    pub fn spawn(self) -> (WorkerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let handle = WorkerHandle {
            tx,
            state: self.state.subscribe(),
        };

        (handle, tokio::spawn(self.run(rx)))
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<Msg>) {
        let Some(Msg::Train { train, validation }) = mailbox.recv().await else {
            info!(worker = self.id; "stopped before receiving any data");
            return;
        };

        self.state.send_replace(WorkerState::Running);
        let res = self.train(&train, &validation).await;
        self.state.send_replace(WorkerState::Done);

        match res {
            Ok(report) => {
                info!(
                    worker = self.id,
                    batches = report.batches_sent,
                    unconfirmed = report.unconfirmed;
                    "training finished"
                );
                self.parent.training_finished(report).await;
            }
            Err(e) => {
                error!(worker = self.id; "training failed: {e}");
                self.parent.failed(e.to_string()).await;
            }
        }
    }

    /// Runs every epoch over `train` and scores the final global model on `validation`.
    ///
    /// Scoring is best effort, a failure there leaves the report without scores.
    ///
    /// # Returns
    /// The training report, or an error if `train` is empty, a snapshot doesn't fit the
    /// configured architecture or the aggregator can't be reached.
    pub async fn train(&mut self, train: &Dataset, validation: &Dataset) -> Result<TrainReport> {
        if train.is_empty() {
            return Err(WorkerErr::EmptyDataset);
        }

        let mut model = Mlp::zeros(self.config.architecture(train.width()))?;
        let mut batches_sent = 0;
        let mut unconfirmed = 0;

        for epoch in 0..self.config.epochs {
            for (x, y) in train.batches(self.config.batch_size) {
                let snapshot = self.client.fetch_snapshot().await?;
                model.install(snapshot)?;

                let grad = model.backward(x, y)?;
                if self.client.send_gradient(grad).await? == Delivery::Unconfirmed {
                    unconfirmed += 1;
                }

                batches_sent += 1;
            }

            debug!(worker = self.id, epoch = epoch; "epoch done");
        }

        let scores = if validation.is_empty() {
            None
        } else {
            match self.score(&mut model, validation).await {
                Ok(scores) => Some(scores),
                Err(e) => {
                    warn!(worker = self.id; "could not score the final model: {e}");
                    None
                }
            }
        };

        Ok(TrainReport {
            batches_sent,
            unconfirmed,
            scores,
        })
    }

    async fn score(&mut self, model: &mut Mlp, validation: &Dataset) -> Result<Scores> {
        model.install(self.client.fetch_snapshot().await?)?;
        Ok(model.evaluate(validation)?)
    }
}
