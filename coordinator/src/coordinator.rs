use std::sync::Arc;

use comms::{
    ActorAddr, RpcResult,
    specs::session::{SessionId, SessionMode, SessionStatus},
};
use log::{error, info, warn};
use machine_learning::metrics::Scores;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::{AbortHandle, JoinHandle},
};
use worker::{
    Connector, Evaluator, EvaluatorHandle, Parent, TrainReport, Worker, WorkerHandle,
};

use crate::{
    CoordinatorErr, PreprocessorHandle, Result, Role, SessionConfig,
    preprocessor::Preprocessor, source::FeatureSource,
};

const MAILBOX_SIZE: usize = 32;

#[derive(Debug)]
enum Event {
    StartTraining {
        aggregator: ActorAddr,
        reply: oneshot::Sender<Result<()>>,
    },
    StartEvaluation {
        aggregator: ActorAddr,
        reply: oneshot::Sender<Result<()>>,
    },
    GetAggregatorAddress {
        reply: oneshot::Sender<Result<ActorAddr>>,
    },
    GetWorker {
        reply: oneshot::Sender<Result<WorkerHandle>>,
    },
    GetEvaluator {
        reply: oneshot::Sender<Result<EvaluatorHandle>>,
    },
    PreprocessingFinished,
    TrainingFinished(TrainReport),
    EvaluationFinished(Scores),
    ChildFailed {
        role: Role,
        reason: String,
    },
    Shutdown,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::StartTraining { .. } => "start training",
            Event::StartEvaluation { .. } => "start evaluation",
            Event::GetAggregatorAddress { .. } => "aggregator lookup",
            Event::GetWorker { .. } => "worker lookup",
            Event::GetEvaluator { .. } => "evaluator lookup",
            Event::PreprocessingFinished => "preprocessing finished",
            Event::TrainingFinished(_) => "training finished",
            Event::EvaluationFinished(_) => "evaluation finished",
            Event::ChildFailed { .. } => "child failed",
            Event::Shutdown => "shutdown",
        }
    }
}

/// A cheap, cloneable way of talking to a session's `Coordinator`.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Event>,
}

impl CoordinatorHandle {
    async fn notify(&self, event: Event) -> Result<()> {
        self.tx.send(event).await.map_err(|_| CoordinatorErr::Stopped)
    }

    async fn request<T>(&self, event: Event, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.notify(event).await?;
        rx.await.map_err(|_| CoordinatorErr::Stopped)?
    }

    /// Starts a training session against the aggregator at `aggregator`.
    pub async fn start_training(&self, aggregator: ActorAddr) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Event::StartTraining { aggregator, reply }, rx)
            .await
    }

    /// Starts an evaluation session against the aggregator at `aggregator`.
    pub async fn start_evaluation(&self, aggregator: ActorAddr) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Event::StartEvaluation { aggregator, reply }, rx)
            .await
    }

    /// Looks up the session's aggregator address.
    ///
    /// # Returns
    /// `CoordinatorErr::NotReady` if the session hasn't started yet.
    pub async fn aggregator_addr(&self) -> Result<ActorAddr> {
        let (reply, rx) = oneshot::channel();
        self.request(Event::GetAggregatorAddress { reply }, rx).await
    }

    /// Looks up the session's worker.
    pub async fn worker(&self) -> Result<WorkerHandle> {
        let (reply, rx) = oneshot::channel();
        self.request(Event::GetWorker { reply }, rx).await
    }

    /// Looks up the session's evaluator.
    pub async fn evaluator(&self) -> Result<EvaluatorHandle> {
        let (reply, rx) = oneshot::channel();
        self.request(Event::GetEvaluator { reply }, rx).await
    }

    pub async fn preprocessing_finished(&self) -> Result<()> {
        self.notify(Event::PreprocessingFinished).await
    }

    pub async fn training_finished(&self, report: TrainReport) -> Result<()> {
        self.notify(Event::TrainingFinished(report)).await
    }

    pub async fn evaluation_finished(&self, scores: Scores) -> Result<()> {
        self.notify(Event::EvaluationFinished(scores)).await
    }

    /// Reports that a child can't go on, which ends the session.
    pub async fn child_failed(&self, role: Role, reason: String) -> Result<()> {
        self.notify(Event::ChildFailed { role, reason }).await
    }

    /// Stops every child and ends the session if it's still running.
    pub async fn shutdown(&self) -> Result<()> {
        self.notify(Event::Shutdown).await
    }
}

/// The `Parent` of a worker or an evaluator, it forwards to the coordinator.
struct ChildLink {
    coordinator: CoordinatorHandle,
    role: Role,
}

#[async_trait::async_trait]
impl Parent for ChildLink {
    async fn aggregator_addr(&self) -> RpcResult<ActorAddr> {
        Ok(self.coordinator.aggregator_addr().await?)
    }

    async fn training_finished(&self, report: TrainReport) {
        if self.coordinator.training_finished(report).await.is_err() {
            warn!("{} finished after its session ended", self.role);
        }
    }

    async fn evaluation_finished(&self, scores: Scores) {
        if self.coordinator.evaluation_finished(scores).await.is_err() {
            warn!("{} finished after its session ended", self.role);
        }
    }

    async fn failed(&self, reason: String) {
        let _ = self.coordinator.child_failed(self.role, reason).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Active(SessionMode),
    Terminated,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Active(SessionMode::Training) => "training",
            State::Active(SessionMode::Evaluation) => "evaluating",
            State::Terminated => "terminated",
        }
    }
}

struct Child<H> {
    handle: H,
    abort: AbortHandle,
}

#[derive(Default)]
struct Children {
    preprocessor: Option<Child<PreprocessorHandle>>,
    worker: Option<Child<WorkerHandle>>,
    evaluator: Option<Child<EvaluatorHandle>>,
    aggregator: Option<ActorAddr>,
}

fn stop<H>(child: &mut Option<Child<H>>) {
    if let Some(child) = child.take() {
        child.abort.abort();
    }
}

/// The state machine of one session.
///
/// It spawns the session's children, answers their lookups and moves the session through
/// `Idle -> Active -> Terminated`. A failing child ends the session, nothing is restarted.
pub struct Coordinator {
    id: SessionId,
    config: SessionConfig,
    source: Arc<dyn FeatureSource>,
    connector: Arc<dyn Connector>,
    state: State,
    children: Children,
    status: watch::Sender<SessionStatus>,
}

impl Coordinator {
    /// Creates a new `Coordinator`.
    ///
    /// # Arguments
    /// * `id` - The session's identifier.
    /// * `config` - The session's configuration.
    /// * `source` - Where the preprocessor loads the features from.
    /// * `connector` - How the children reach the aggregator.
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        source: Arc<dyn FeatureSource>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            id,
            config,
            source,
            connector,
            state: State::Idle,
            children: Children::default(),
            status: watch::Sender::new(SessionStatus::Idle),
        }
    }

    /// Starts the coordinator in a new task.
    ///
    /// # Returns
    /// A handle to it, a receiver that observes the session's status and the task's join
    /// handle.
    pub fn spawn(
        self,
    ) -> (
        CoordinatorHandle,
        watch::Receiver<SessionStatus>,
        JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::channel(MAILBOX_SIZE);
        let handle = CoordinatorHandle { tx };
        let status = self.status.subscribe();
        let task = tokio::spawn(self.run(rx, handle.clone()));
        (handle, status, task)
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<Event>, me: CoordinatorHandle) {
        while let Some(event) = mailbox.recv().await {
            self.handle(event, &me).await;

            if self.state == State::Terminated {
                break;
            }
        }

        self.stop_all();
    }

    async fn handle(&mut self, event: Event, me: &CoordinatorHandle) {
        match (self.state, event) {
            (State::Idle, Event::StartTraining { aggregator, reply }) => {
                let res = self.start(SessionMode::Training, aggregator, me).await;
                let _ = reply.send(res);
            }
            (State::Idle, Event::StartEvaluation { aggregator, reply }) => {
                let res = self.start(SessionMode::Evaluation, aggregator, me).await;
                let _ = reply.send(res);
            }
            (state, Event::StartTraining { reply, .. }) => {
                let _ = reply.send(Err(CoordinatorErr::InvalidState {
                    state: state.name(),
                    event: "start training",
                }));
            }
            (state, Event::StartEvaluation { reply, .. }) => {
                let _ = reply.send(Err(CoordinatorErr::InvalidState {
                    state: state.name(),
                    event: "start evaluation",
                }));
            }
            (_, Event::GetAggregatorAddress { reply }) => {
                let addr = self.children.aggregator.clone();
                let _ = reply.send(addr.ok_or(CoordinatorErr::NotReady(Role::Aggregator)));
            }
            (_, Event::GetWorker { reply }) => {
                let worker = self.children.worker.as_ref().map(|c| c.handle.clone());
                let _ = reply.send(worker.ok_or(CoordinatorErr::NotReady(Role::Worker)));
            }
            (_, Event::GetEvaluator { reply }) => {
                let evaluator = self.children.evaluator.as_ref().map(|c| c.handle.clone());
                let _ = reply.send(evaluator.ok_or(CoordinatorErr::NotReady(Role::Evaluator)));
            }
            (State::Active(_), Event::PreprocessingFinished) => {
                info!(session = self.id; "preprocessing finished");
                stop(&mut self.children.preprocessor);
            }
            (State::Active(SessionMode::Training), Event::TrainingFinished(report)) => {
                stop(&mut self.children.worker);
                self.terminate(SessionStatus::Completed {
                    mode: SessionMode::Training,
                    scores: report.scores.map(Into::into),
                });
            }
            (State::Active(SessionMode::Evaluation), Event::EvaluationFinished(scores)) => {
                stop(&mut self.children.evaluator);
                self.terminate(SessionStatus::Completed {
                    mode: SessionMode::Evaluation,
                    scores: Some(scores.into()),
                });
            }
            (State::Active(_), Event::ChildFailed { role, reason }) => {
                error!(session = self.id; "{role} failed: {reason}");
                self.stop_all();
                self.terminate(SessionStatus::Failed {
                    reason: format!("{role} failed: {reason}"),
                });
            }
            (_, Event::Shutdown) => {
                self.stop_all();
                self.terminate(SessionStatus::Failed {
                    reason: "the runtime shut down".to_string(),
                });
            }
            (state, event) => {
                warn!(session = self.id; "ignoring {} while {}", event.name(), state.name());
            }
        }
    }

    async fn start(
        &mut self,
        mode: SessionMode,
        aggregator: ActorAddr,
        me: &CoordinatorHandle,
    ) -> Result<()> {
        let SessionConfig {
            training,
            split_ratio,
            seed,
            ..
        } = self.config.clone();

        let link = |role: Role| -> Arc<dyn Parent> {
            Arc::new(ChildLink {
                coordinator: me.clone(),
                role,
            })
        };

        let preprocessor = Preprocessor::new(
            Arc::clone(&self.source),
            split_ratio,
            seed,
            me.clone(),
            training.clone(),
        );
        let (preprocessor, task) = preprocessor.spawn();
        let abort = supervise(Role::Preprocessor, task, me.clone());
        self.children.preprocessor = Some(Child {
            handle: preprocessor.clone(),
            abort,
        });

        match mode {
            SessionMode::Training => {
                let name = format!("worker-{}", self.id);
                let worker = Worker::new(name, training, link(Role::Worker), Arc::clone(&self.connector));
                let (handle, task) = worker.spawn();
                let abort = supervise(Role::Worker, task, me.clone());
                self.children.worker = Some(Child { handle, abort });
            }
            SessionMode::Evaluation => {
                let name = format!("evaluator-{}", self.id);
                let evaluator =
                    Evaluator::new(name, training, link(Role::Evaluator), Arc::clone(&self.connector));
                let (handle, task) = evaluator.spawn();
                let abort = supervise(Role::Evaluator, task, me.clone());
                self.children.evaluator = Some(Child { handle, abort });
            }
        }

        info!(session = self.id; "session started against {aggregator}");
        self.children.aggregator = Some(aggregator);
        self.state = State::Active(mode);
        self.status.send_replace(SessionStatus::Active { mode });

        preprocessor.preprocess(mode).await
    }

    fn stop_all(&mut self) {
        stop(&mut self.children.preprocessor);
        stop(&mut self.children.worker);
        stop(&mut self.children.evaluator);
    }

    fn terminate(&mut self, status: SessionStatus) {
        info!(session = self.id; "session terminated: {status:?}");
        self.state = State::Terminated;
        self.children.aggregator = None;
        self.status.send_replace(status);
    }
}

/// Reports a panicking child as a failure of its session.
fn supervise(role: Role, task: JoinHandle<()>, coordinator: CoordinatorHandle) -> AbortHandle {
    let abort = task.abort_handle();

    tokio::spawn(async move {
        if let Err(e) = task.await
            && e.is_panic()
        {
            let _ = coordinator.child_failed(role, "panicked".to_string()).await;
        }
    });

    abort
}
