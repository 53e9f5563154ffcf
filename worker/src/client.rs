use std::{sync::Arc, time::Duration};

use aggregator::AggregatorLink;
use comms::{ActorAddr, RpcErr, RpcResult, bounded};
use log::{debug, warn};
use machine_learning::arch::{GradientBatch, ModelSnapshot};

use crate::{Connector, Parent, Result, RetryPolicy, WorkerErr};

/// The outcome of sending a gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The aggregator acknowledged the gradient.
    Confirmed,
    /// The gradient was sent but no acknowledgement arrived in time. It may or may not have
    /// been applied and it won't be sent again.
    Unconfirmed,
}

/// Talks to the session's aggregator on behalf of a worker or an evaluator.
///
/// The aggregator's address is looked up through the parent before every request and the
/// open link is kept while the address stays the same.
pub struct AggregatorClient {
    parent: Arc<dyn Parent>,
    connector: Arc<dyn Connector>,
    link: Option<(ActorAddr, Box<dyn AggregatorLink>)>,
    lookup_timeout: Duration,
    rpc_timeout: Duration,
    retry: RetryPolicy,
}

impl AggregatorClient {
    /// Creates a new `AggregatorClient`.
    ///
    /// # Arguments
    /// * `parent` - Answers the aggregator address lookups.
    /// * `connector` - Opens the links to the aggregator.
    /// * `lookup_timeout` - The bounded wait for a lookup.
    /// * `rpc_timeout` - The bounded wait for connecting and for every request.
    /// * `retry` - How retryable failures are retried.
    pub fn new(
        parent: Arc<dyn Parent>,
        connector: Arc<dyn Connector>,
        lookup_timeout: Duration,
        rpc_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            parent,
            connector,
            link: None,
            lookup_timeout,
            rpc_timeout,
            retry,
        }
    }

    /// Takes the cached link if it still points to the aggregator, opens a new one otherwise.
    async fn checkout(&mut self) -> RpcResult<(ActorAddr, Box<dyn AggregatorLink>)> {
        let addr = bounded(
            "aggregator address",
            self.lookup_timeout,
            self.parent.aggregator_addr(),
        )
        .await?;

        match self.link.take() {
            Some((cached, link)) if cached == addr => Ok((addr, link)),
            _ => {
                let connect = self.connector.connect(&addr);
                let link = bounded("aggregator connection", self.rpc_timeout, connect).await?;
                debug!("linked to aggregator {addr}");
                Ok((addr, link))
            }
        }
    }

    /// Fetches the current global model, retrying lookups, connections and timeouts.
    pub async fn fetch_snapshot(&mut self) -> Result<ModelSnapshot> {
        let mut attempt = 0;

        loop {
            let res = match self.checkout().await {
                Ok((addr, mut link)) => {
                    let res = bounded(
                        "global weights",
                        self.rpc_timeout,
                        link.get_global_weights(),
                    )
                    .await;

                    // A link that timed out may still deliver the stale reply later.
                    if res.is_ok() {
                        self.link = Some((addr, link));
                    }

                    res
                }
                Err(e) => Err(e),
            };

            match res {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => self.retry.wait(&mut attempt, "global weights", e).await?,
            }
        }
    }

    /// Sends a gradient to the aggregator at most once.
    ///
    /// Failing to reach the aggregator before sending is retried. Once the gradient is on
    /// its way a missing acknowledgement only makes the delivery unconfirmed.
    ///
    /// # Returns
    /// The delivery outcome, or an error if the aggregator couldn't be reached or rejected
    /// the gradient's shapes.
    pub async fn send_gradient(&mut self, batch: GradientBatch) -> Result<Delivery> {
        let mut attempt = 0;

        let (addr, mut link) = loop {
            match self.checkout().await {
                Ok(checked) => break checked,
                Err(e) => self.retry.wait(&mut attempt, "aggregator link", e).await?,
            }
        };

        let ack = bounded(
            "gradient acknowledgement",
            self.rpc_timeout,
            link.apply_gradient(batch),
        )
        .await;

        match ack {
            Ok(()) => {
                self.link = Some((addr, link));
                Ok(Delivery::Confirmed)
            }
            Err(e @ RpcErr::ShapeMismatch(_)) => Err(WorkerErr::Rpc {
                what: "gradient",
                source: e,
            }),
            Err(e) => {
                warn!("gradient delivery to {addr} unconfirmed: {e}");
                Ok(Delivery::Unconfirmed)
            }
        }
    }
}
