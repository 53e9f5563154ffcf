use comms::{
    ActorAddr, FrameReceiver, FrameSender, RpcErr, RpcResult,
    msg::{Command, Msg, Payload},
};
use log::debug;
use machine_learning::arch::{GradientBatch, ModelSnapshot};
use tokio::net::{
    TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};

use crate::AggregatorLink;

/// A connection to an aggregator hosted by a remote `Node`.
pub struct RemoteAggregator {
    addr: ActorAddr,
    rx: FrameReceiver<OwnedReadHalf>,
    tx: FrameSender<OwnedWriteHalf>,
}

impl RemoteAggregator {
    /// Connects to the aggregator at `addr` and performs the connection handshake.
    ///
    /// # Returns
    /// `RpcErr::Unavailable` if the node can't be reached or doesn't know the actor.
    pub async fn connect(addr: &ActorAddr) -> RpcResult<Self> {
        let stream = TcpStream::connect(&addr.host).await?;
        let (rx, tx) = stream.into_split();
        let (mut rx, mut tx) = comms::channel(rx, tx);

        let connect = Command::Connect {
            name: addr.name.clone(),
        };
        tx.send(&Msg::Control(connect)).await?;

        match rx.recv().await? {
            Msg::Control(Command::Connected) => {
                debug!("connected to {addr}");
                Ok(Self {
                    addr: addr.clone(),
                    rx,
                    tx,
                })
            }
            Msg::Err(detail) => Err(RpcErr::Unavailable(detail)),
            msg => Err(unexpected(&msg)),
        }
    }

    /// Returns the address this connection points to.
    pub fn addr(&self) -> &ActorAddr {
        &self.addr
    }

    /// Tells the node this connection is over.
    pub async fn disconnect(mut self) -> RpcResult<()> {
        self.tx.send(&Msg::Control(Command::Disconnect)).await?;
        self.tx.shutdown().await?;
        Ok(())
    }
}

fn unexpected(msg: &Msg) -> RpcErr {
    RpcErr::Protocol(format!("unexpected {} message", msg.kind()))
}

#[async_trait::async_trait]
impl AggregatorLink for RemoteAggregator {
    async fn get_global_weights(&mut self) -> RpcResult<ModelSnapshot> {
        self.tx.send(&Msg::Control(Command::GetGlobalWeights)).await?;

        match self.rx.recv().await? {
            Msg::Data(Payload::Weights(layers)) => ModelSnapshot::from_params(layers)
                .map_err(|e| RpcErr::ShapeMismatch(e.to_string())),
            Msg::Err(detail) => Err(RpcErr::Unavailable(detail)),
            msg => Err(unexpected(&msg)),
        }
    }

    async fn apply_gradient(&mut self, batch: GradientBatch) -> RpcResult<()> {
        self.tx.send(&Msg::Data(Payload::from(&batch))).await?;

        match self.rx.recv().await? {
            Msg::Control(Command::Ack) => Ok(()),
            Msg::Control(Command::IncompatibleShape { detail }) => {
                Err(RpcErr::ShapeMismatch(detail))
            }
            Msg::Err(detail) => Err(RpcErr::Unavailable(detail)),
            msg => Err(unexpected(&msg)),
        }
    }
}
