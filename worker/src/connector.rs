use aggregator::{AggregatorHandle, AggregatorLink, RemoteAggregator};
use comms::{ActorAddr, RpcResult};

/// Opens links to aggregators given their address.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: &ActorAddr) -> RpcResult<Box<dyn AggregatorLink>>;
}

/// Reaches aggregators hosted by remote nodes over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &ActorAddr) -> RpcResult<Box<dyn AggregatorLink>> {
        let remote = RemoteAggregator::connect(addr).await?;
        Ok(Box::new(remote))
    }
}

/// An in-process aggregator, every address resolves to it.
#[async_trait::async_trait]
impl Connector for AggregatorHandle {
    async fn connect(&self, _addr: &ActorAddr) -> RpcResult<Box<dyn AggregatorLink>> {
        Ok(Box::new(self.clone()))
    }
}
