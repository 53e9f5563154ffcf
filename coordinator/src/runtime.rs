use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use comms::{
    ActorAddr,
    specs::session::{SessionId, SessionMode, SessionStatus},
};
use futures::future;
use log::{debug, info};
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};
use worker::Connector;

use crate::{
    Coordinator, CoordinatorErr, CoordinatorHandle, Result, SessionConfig,
    source::FeatureSource,
};

/// How many finished sessions are kept around to answer status queries.
pub const DEFAULT_RETAINED_SESSIONS: usize = 64;

struct Session {
    handle: CoordinatorHandle,
    status: watch::Receiver<SessionStatus>,
    task: Option<JoinHandle<()>>,
}

/// The process wide home of every session.
///
/// It's initialized once, starts independent sessions on demand and answers their status
/// until it's shut down. Only the most recent finished sessions are remembered, older ones
/// are forgotten as new sessions start.
pub struct Runtime {
    config: SessionConfig,
    source: Arc<dyn FeatureSource>,
    connector: Arc<dyn Connector>,
    next_id: AtomicU64,
    retained: usize,
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl Runtime {
    /// Creates the runtime, loading the features from the configured dataset.
    ///
    /// # Arguments
    /// * `config` - The configuration every session starts with.
    /// * `connector` - How the sessions reach their aggregator.
    pub fn init(config: SessionConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let source = config.dataset.source()?;
        Self::with_source(config, source, connector)
    }

    /// Creates the runtime with an explicit feature source.
    pub fn with_source(
        config: SessionConfig,
        source: Arc<dyn FeatureSource>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            source,
            connector,
            next_id: AtomicU64::new(1),
            retained: DEFAULT_RETAINED_SESSIONS,
            sessions: Mutex::default(),
        })
    }

    /// Sets how many finished sessions are kept to answer status queries.
    pub fn retain_finished(mut self, retained: usize) -> Self {
        self.retained = retained;
        self
    }

    /// Forgets the oldest finished sessions beyond the retained amount.
    fn evict_finished(&self, sessions: &mut HashMap<SessionId, Session>) {
        let mut finished: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, s)| s.status.borrow().is_terminal())
            .map(|(id, _)| *id)
            .collect();

        if finished.len() <= self.retained {
            return;
        }

        finished.sort_unstable();
        let evicted = finished.len() - self.retained;
        for id in &finished[..evicted] {
            sessions.remove(id);
        }

        debug!("forgot {evicted} finished session(s)");
    }

    /// Starts a training session against the aggregator at `aggregator`.
    pub async fn start_training(&self, aggregator: ActorAddr) -> Result<SessionId> {
        self.start(SessionMode::Training, aggregator).await
    }

    /// Starts an evaluation session against the aggregator at `aggregator`.
    pub async fn start_evaluation(&self, aggregator: ActorAddr) -> Result<SessionId> {
        self.start(SessionMode::Evaluation, aggregator).await
    }

    async fn start(&self, mode: SessionMode, aggregator: ActorAddr) -> Result<SessionId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let coordinator = Coordinator::new(
            id,
            self.config.clone(),
            Arc::clone(&self.source),
            Arc::clone(&self.connector),
        );

        let (handle, status, task) = coordinator.spawn();
        {
            let mut sessions = self.sessions.lock();
            self.evict_finished(&mut sessions);
            sessions.insert(
                id,
                Session {
                    handle: handle.clone(),
                    status,
                    task: Some(task),
                },
            );
        }

        let started = match mode {
            SessionMode::Training => handle.start_training(aggregator).await,
            SessionMode::Evaluation => handle.start_evaluation(aggregator).await,
        };

        if let Err(e) = started {
            let _ = handle.shutdown().await;
            return Err(e);
        }

        info!(session = id; "{mode:?} session started");
        Ok(id)
    }

    /// Returns the current status of a session.
    pub fn status(&self, id: SessionId) -> Result<SessionStatus> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(&id)
            .ok_or(CoordinatorErr::UnknownSession(id))?;

        Ok(session.status.borrow().clone())
    }

    /// Waits until a session reaches its terminal status.
    pub async fn wait(&self, id: SessionId) -> Result<SessionStatus> {
        let mut status = self
            .sessions
            .lock()
            .get(&id)
            .map(|s| s.status.clone())
            .ok_or(CoordinatorErr::UnknownSession(id))?;

        let res = status.wait_for(SessionStatus::is_terminal).await;
        match res {
            Ok(status) => Ok(status.clone()),
            Err(_) => Ok(SessionStatus::Failed {
                reason: "the coordinator stopped unexpectedly".to_string(),
            }),
        }
    }

    /// Returns the ids of every session still remembered, live or recently finished.
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Ends every running session and waits for their coordinators to stop.
    pub async fn shutdown(&self) {
        let live: Vec<_> = self
            .sessions
            .lock()
            .values_mut()
            .filter_map(|s| Some((s.handle.clone(), s.task.take()?)))
            .collect();

        info!("shutting down {} session(s)", live.len());

        future::join_all(live.into_iter().map(|(handle, task)| async move {
            // A coordinator that already finished has closed its mailbox.
            let _ = handle.shutdown().await;
            let _ = task.await;
        }))
        .await;
    }
}
