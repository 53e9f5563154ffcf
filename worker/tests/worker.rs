use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use aggregator::{Aggregator, AggregatorHandle, AggregatorLink};
use comms::{ActorAddr, RpcErr, RpcResult};
use machine_learning::{
    arch::{GradientBatch, ModelSnapshot, Mlp},
    dataset::Dataset,
    metrics::Scores,
    optimization::GradientDescent,
};
use ndarray::{Array1, Array2};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use worker::{
    Connector, Evaluator, Parent, RetryPolicy, TrainReport, TrainingConfig, Worker, WorkerErr,
    WorkerState,
};

#[derive(Debug)]
enum Event {
    Trained(TrainReport),
    Evaluated(Scores),
    Failed(String),
}

/// Answers lookups after `not_ready` failed attempts and forwards every report.
struct TestParent {
    not_ready: AtomicUsize,
    events: mpsc::UnboundedSender<Event>,
}

impl TestParent {
    fn new(not_ready: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        let parent = Self {
            not_ready: AtomicUsize::new(not_ready),
            events,
        };
        (Arc::new(parent), rx)
    }
}

#[async_trait::async_trait]
impl Parent for TestParent {
    async fn aggregator_addr(&self) -> RpcResult<ActorAddr> {
        let ready = self
            .not_ready
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err();

        if ready {
            Ok(ActorAddr::new("127.0.0.1:8091", "aggregator"))
        } else {
            Err(RpcErr::Unavailable("aggregator not spawned yet".into()))
        }
    }

    async fn training_finished(&self, report: TrainReport) {
        let _ = self.events.send(Event::Trained(report));
    }

    async fn evaluation_finished(&self, scores: Scores) {
        let _ = self.events.send(Event::Evaluated(scores));
    }

    async fn failed(&self, reason: String) {
        let _ = self.events.send(Event::Failed(reason));
    }
}

/// Forwards to a real aggregator while recording traffic, optionally hanging on the
/// first `hang_fetches` snapshot requests or on every gradient, and failing every fetch
/// from the `fail_fetches_from`-th one on.
#[derive(Clone)]
struct Recorder {
    inner: AggregatorHandle,
    gradients: Arc<Mutex<Vec<GradientBatch>>>,
    connects: Arc<AtomicUsize>,
    fetches: Arc<AtomicUsize>,
    hang_fetches: Arc<AtomicUsize>,
    hang_gradients: bool,
    fail_fetches_from: Option<usize>,
}

impl Recorder {
    fn new(model: Mlp) -> Self {
        let (inner, _) = Aggregator::new(model, GradientDescent::new(0.3)).spawn();
        Self {
            inner,
            gradients: Arc::default(),
            connects: Arc::default(),
            fetches: Arc::default(),
            hang_fetches: Arc::default(),
            hang_gradients: false,
            fail_fetches_from: None,
        }
    }
}

#[async_trait::async_trait]
impl AggregatorLink for Recorder {
    async fn get_global_weights(&mut self) -> RpcResult<ModelSnapshot> {
        let nth = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_fetches_from.is_some_and(|from| nth >= from) {
            return Err(RpcErr::Unavailable("aggregator went away".into()));
        }

        let hang = self
            .hang_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if hang {
            std::future::pending::<()>().await;
        }

        AggregatorLink::get_global_weights(&mut self.inner).await
    }

    async fn apply_gradient(&mut self, batch: GradientBatch) -> RpcResult<()> {
        self.gradients.lock().push(batch.clone());
        if self.hang_gradients {
            std::future::pending::<()>().await;
        }

        AggregatorLink::apply_gradient(&mut self.inner, batch).await
    }
}

#[async_trait::async_trait]
impl Connector for Recorder {
    async fn connect(&self, _addr: &ActorAddr) -> RpcResult<Box<dyn AggregatorLink>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}

fn config(hidden: Vec<usize>, batch_size: usize, epochs: usize) -> TrainingConfig {
    TrainingConfig {
        epochs,
        batch_size: NonZeroUsize::new(batch_size).unwrap(),
        hidden_layers: hidden,
        lookup_timeout: Duration::from_millis(200),
        rpc_timeout: Duration::from_millis(100),
        retry: RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
    }
}

fn dataset(rows: usize, width: usize) -> Dataset {
    let features = Array2::from_shape_fn((rows, width), |(i, j)| ((i + j) % 5) as f64 / 5.0);
    let labels = Array1::from_shape_fn(rows, |i| (i % 2) as f64);
    Dataset::new(features, labels).unwrap()
}

#[tokio::test]
async fn ten_rows_in_batches_of_five_send_two_gradients() {
    let recorder = Recorder::new(Mlp::random(vec![4, 3, 1], Some(1)).unwrap());
    let (parent, _events) = TestParent::new(0);
    let mut worker = Worker::new("w0", config(vec![3], 5, 1), parent, Arc::new(recorder.clone()));

    let report = worker
        .train(&dataset(10, 4), &Dataset::empty(4))
        .await
        .unwrap();

    assert_eq!(report.batches_sent, 2);
    assert_eq!(report.unconfirmed, 0);
    assert_eq!(report.scores, None);

    let gradients = recorder.gradients.lock();
    assert_eq!(gradients.len(), 2);
    for grad in gradients.iter() {
        assert_eq!(grad.batch_size, 5);
        assert_eq!(grad.layers[0].dim(), (4, 3));
        assert_eq!(grad.layers[1].dim(), (3, 1));
    }

    // The link is reused while the address doesn't change.
    assert_eq!(recorder.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn spawned_worker_reports_to_its_parent() {
    let recorder = Recorder::new(Mlp::random(vec![2, 3, 1], Some(2)).unwrap());
    let (parent, mut events) = TestParent::new(2);
    let worker = Worker::new("w1", config(vec![3], 4, 2), parent, Arc::new(recorder));

    let (handle, task) = worker.spawn();
    assert_eq!(handle.state(), WorkerState::Idle);

    handle.train(dataset(8, 2), dataset(4, 2)).await.unwrap();
    task.await.unwrap();
    assert_eq!(handle.state(), WorkerState::Done);

    let Some(Event::Trained(report)) = events.recv().await else {
        panic!("expected a training report");
    };
    assert_eq!(report.batches_sent, 4);
    let scores = report.scores.unwrap();
    assert_eq!(
        scores.true_positives + scores.false_negatives,
        2,
        "two of the validation rows are positive"
    );
}

#[tokio::test]
async fn snapshot_timeouts_are_retried_on_a_fresh_link() {
    let recorder = Recorder::new(Mlp::random(vec![2, 1], Some(3)).unwrap());
    recorder.hang_fetches.store(2, Ordering::SeqCst);
    let (parent, _events) = TestParent::new(0);
    let mut worker = Worker::new("w2", config(vec![], 3, 1), parent, Arc::new(recorder.clone()));

    let report = worker
        .train(&dataset(3, 2), &Dataset::empty(2))
        .await
        .unwrap();

    assert_eq!(report.batches_sent, 1);
    assert_eq!(recorder.connects.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unacknowledged_gradients_are_never_resent() {
    let mut recorder = Recorder::new(Mlp::random(vec![2, 1], Some(4)).unwrap());
    recorder.hang_gradients = true;
    let (parent, _events) = TestParent::new(0);
    let mut worker = Worker::new("w3", config(vec![], 2, 1), parent, Arc::new(recorder.clone()));

    let report = worker
        .train(&dataset(6, 2), &Dataset::empty(2))
        .await
        .unwrap();

    assert_eq!(report.batches_sent, 3);
    assert_eq!(report.unconfirmed, 3);
    assert_eq!(recorder.gradients.lock().len(), 3);
}

#[tokio::test]
async fn exhausted_lookups_fail_the_worker() {
    let recorder = Recorder::new(Mlp::random(vec![2, 1], Some(5)).unwrap());
    let (parent, _events) = TestParent::new(usize::MAX);
    let mut worker = Worker::new("w4", config(vec![], 2, 1), parent, Arc::new(recorder));

    let err = worker
        .train(&dataset(2, 2), &Dataset::empty(2))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkerErr::Rpc {
            source: RpcErr::Unavailable(_),
            ..
        }
    ));
}

#[tokio::test]
async fn empty_training_set_is_refused() {
    let recorder = Recorder::new(Mlp::random(vec![2, 1], Some(6)).unwrap());
    let (parent, mut events) = TestParent::new(0);
    let worker = Worker::new("w5", config(vec![], 2, 1), parent, Arc::new(recorder.clone()));

    let (handle, task) = worker.spawn();
    handle
        .train(Dataset::empty(2), Dataset::empty(2))
        .await
        .unwrap();
    task.await.unwrap();

    assert!(matches!(events.recv().await, Some(Event::Failed(_))));
    assert!(recorder.gradients.lock().is_empty());
}

#[tokio::test]
async fn snapshot_of_another_architecture_is_fatal() {
    let recorder = Recorder::new(Mlp::random(vec![4, 2, 1], Some(7)).unwrap());
    let (parent, _events) = TestParent::new(0);
    let mut worker = Worker::new("w6", config(vec![3], 2, 1), parent, Arc::new(recorder.clone()));

    let err = worker
        .train(&dataset(4, 4), &Dataset::empty(4))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerErr::Model(ref e) if e.is_shape_mismatch()));
    assert!(recorder.gradients.lock().is_empty());
}

#[tokio::test]
async fn evaluator_scores_the_global_model() {
    // A zero model outputs sigmoid(0) = 0.5 everywhere, so every row is predicted positive.
    let recorder = Recorder::new(Mlp::zeros(vec![2, 1]).unwrap());
    let (parent, mut events) = TestParent::new(1);
    let evaluator = Evaluator::new("e0", config(vec![], 2, 1), parent, Arc::new(recorder));

    let validation = Dataset::from_rows(
        vec![vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]],
        vec![1.0, 0.0, 1.0],
    )
    .unwrap();

    let (handle, task) = evaluator.spawn();
    handle.evaluate(validation).await.unwrap();
    task.await.unwrap();

    let Some(Event::Evaluated(scores)) = events.recv().await else {
        panic!("expected scores");
    };
    assert_eq!(scores.true_positives, 2);
    assert_eq!(scores.false_positives, 1);
    assert_eq!(scores.false_negatives, 0);
    assert!((scores.precision - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(scores.recall, 1.0);
    assert!((scores.f1 - 80.0).abs() < 1e-9);
}

#[tokio::test]
async fn evaluator_refuses_an_empty_set() {
    let recorder = Recorder::new(Mlp::zeros(vec![2, 1]).unwrap());
    let (parent, _events) = TestParent::new(0);
    let mut evaluator = Evaluator::new("e1", config(vec![], 2, 1), parent, Arc::new(recorder));

    assert!(matches!(
        evaluator.evaluate(&Dataset::empty(2)).await,
        Err(WorkerErr::EmptyDataset)
    ));
}

#[tokio::test]
async fn failed_scoring_still_reports_the_training() {
    let mut recorder = Recorder::new(Mlp::random(vec![4, 3, 1], Some(1)).unwrap());
    recorder.fail_fetches_from = Some(3);
    let (parent, mut events) = TestParent::new(0);
    let worker = Worker::new("w9", config(vec![3], 5, 1), parent, Arc::new(recorder.clone()));

    let (handle, task) = worker.spawn();
    handle.train(dataset(10, 4), dataset(4, 4)).await.unwrap();
    task.await.unwrap();

    let Some(Event::Trained(report)) = events.recv().await else {
        panic!("expected a training report");
    };
    assert_eq!(report.batches_sent, 2);
    assert_eq!(report.unconfirmed, 0);
    assert_eq!(report.scores, None);
    assert_eq!(recorder.gradients.lock().len(), 2);
}
