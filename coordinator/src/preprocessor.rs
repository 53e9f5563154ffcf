use std::sync::Arc;

use comms::{RpcErr, bounded, specs::session::SessionMode};
use log::{error, info};
use machine_learning::dataset::Dataset;
use tokio::{
    sync::mpsc,
    task::{self, JoinHandle},
};
use worker::TrainingConfig;

use crate::{CoordinatorHandle, Role, source::FeatureSource};

#[derive(Debug)]
enum Msg {
    Preprocess(SessionMode),
}

/// A way of starting a running `Preprocessor`.
#[derive(Debug, Clone)]
pub struct PreprocessorHandle {
    tx: mpsc::Sender<Msg>,
}

impl PreprocessorHandle {
    /// Asks the preprocessor to prepare the data of a session in `mode`.
    pub async fn preprocess(&self, mode: SessionMode) -> crate::Result<()> {
        self.tx
            .send(Msg::Preprocess(mode))
            .await
            .map_err(|_| crate::CoordinatorErr::Stopped)
    }
}

/// Loads the session's features, splits them and hands them to the session's worker or
/// evaluator.
///
/// A source that fails to load is logged and degrades to an empty dataset, refusing to run
/// over it is up to the receiver.
pub struct Preprocessor {
    source: Arc<dyn FeatureSource>,
    split_ratio: f64,
    seed: u64,
    coordinator: CoordinatorHandle,
    config: TrainingConfig,
}

impl Preprocessor {
    /// Creates a new `Preprocessor`.
    ///
    /// # Arguments
    /// * `source` - Where the features come from.
    /// * `split_ratio` - The fraction of rows used for training.
    /// * `seed` - Seeds the shuffle before splitting.
    /// * `coordinator` - Answers lookups and receives the finished notification.
    /// * `config` - Gives the lookup bounded wait and retry policy.
    pub fn new(
        source: Arc<dyn FeatureSource>,
        split_ratio: f64,
        seed: u64,
        coordinator: CoordinatorHandle,
        config: TrainingConfig,
    ) -> Self {
        Self {
            source,
            split_ratio,
            seed,
            coordinator,
            config,
        }
    }

    /// Starts the preprocessor in a new task.
    pub fn spawn(self) -> (PreprocessorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        (PreprocessorHandle { tx }, tokio::spawn(self.run(rx)))
    }

    async fn run(self, mut mailbox: mpsc::Receiver<Msg>) {
        let Some(Msg::Preprocess(mode)) = mailbox.recv().await else {
            return;
        };

        info!("preprocessing for {mode:?}");
        let (train, validation) = self.prepare().await;
        info!(train = train.len(), validation = validation.len(); "dataset split");

        match self.deliver(mode, train, validation).await {
            Ok(()) => {
                let _ = self.coordinator.preprocessing_finished().await;
            }
            Err(e) => {
                error!("could not deliver the dataset: {e}");
                let _ = self
                    .coordinator
                    .child_failed(Role::Preprocessor, e.to_string())
                    .await;
            }
        }
    }

    async fn prepare(&self) -> (Dataset, Dataset) {
        let source = Arc::clone(&self.source);
        let dataset = match task::spawn_blocking(move || source.load()).await {
            Ok(Ok(dataset)) => dataset,
            Ok(Err(e)) => {
                error!("could not load the features: {e}");
                Dataset::empty(0)
            }
            Err(e) => {
                error!("feature loading crashed: {e}");
                Dataset::empty(0)
            }
        };

        dataset
            .split(self.split_ratio, self.seed)
            .unwrap_or_else(|e| {
                error!("could not split the features: {e}");
                (Dataset::empty(dataset.width()), Dataset::empty(dataset.width()))
            })
    }

    async fn deliver(
        &self,
        mode: SessionMode,
        train: Dataset,
        validation: Dataset,
    ) -> worker::Result<()> {
        let retry = &self.config.retry;
        let timeout = self.config.lookup_timeout;
        let mut attempt = 0;

        match mode {
            SessionMode::Training => {
                let worker = loop {
                    let lookup = async { Ok::<_, RpcErr>(self.coordinator.worker().await?) };
                    match bounded("worker lookup", timeout, lookup).await {
                        Ok(worker) => break worker,
                        Err(e) => retry.wait(&mut attempt, "child lookup", e).await?,
                    }
                };

                worker.train(train, validation).await
            }
            SessionMode::Evaluation => {
                let evaluator = loop {
                    let lookup = async { Ok::<_, RpcErr>(self.coordinator.evaluator().await?) };
                    match bounded("evaluator lookup", timeout, lookup).await {
                        Ok(evaluator) => break evaluator,
                        Err(e) => retry.wait(&mut attempt, "child lookup", e).await?,
                    }
                };

                evaluator.evaluate(validation).await
            }
        }
    }
}
