use std::sync::Arc;

use log::{error, info};
use machine_learning::{arch::Mlp, dataset::Dataset, metrics::Scores};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{AggregatorClient, Connector, Parent, Result, TrainingConfig, WorkerErr};

#[derive(Debug)]
enum Msg {
    Evaluate { validation: Dataset },
}

/// A way of handing data to a running `Evaluator`.
#[derive(Debug, Clone)]
pub struct EvaluatorHandle {
    tx: mpsc::Sender<Msg>,
}

impl EvaluatorHandle {
    /// Starts the evaluation of the global model against `validation`.
    pub async fn evaluate(&self, validation: Dataset) -> Result<()> {
        self.tx
            .send(Msg::Evaluate { validation })
            .await
            .map_err(|_| WorkerErr::Stopped)
    }
}

/// Scores one snapshot of the global model against a held out set, once.
pub struct Evaluator {
    id: String,
    config: TrainingConfig,
    client: AggregatorClient,
    parent: Arc<dyn Parent>,
}

impl Evaluator {
    /// Creates a new `Evaluator`.
    ///
    /// # Arguments
    /// * `id` - Identifier used for observability.
    /// * `config` - Gives the architecture and the bounded waits.
    /// * `parent` - Answers lookups and receives the scores.
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
        }
    }

    /// Starts the evaluator in a new task, it waits for its data and then evaluates.
    pub fn spawn(self) -> (EvaluatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        (EvaluatorHandle { tx }, tokio::spawn(self.run(rx)))
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<Msg>) {
        let Some(Msg::Evaluate { validation }) = mailbox.recv().await else {
            info!(evaluator = self.id; "stopped before receiving any data");
            return;
        };

        match self.evaluate(&validation).await {
            Ok(scores) => {
                info!(
                    evaluator = self.id,
                    precision = scores.precision,
                    recall = scores.recall,
                    f1 = scores.f1;
                    "evaluation finished"
                );
                self.parent.evaluation_finished(scores).await;
            }
            Err(e) => {
                error!(evaluator = self.id; "evaluation failed: {e}");
                self.parent.failed(e.to_string()).await;
            }
        }
    }

    /// Fetches the global model and scores it against `validation`.
    pub async fn evaluate(&mut self, validation: &Dataset) -> Result<Scores> {
        if validation.is_empty() {
            return Err(WorkerErr::EmptyDataset);
        }

        let mut model = Mlp::zeros(self.config.architecture(validation.width()))?;
        model.install(self.client.fetch_snapshot().await?)?;
        Ok(model.evaluate(validation)?)
    }
}
