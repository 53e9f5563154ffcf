use std::{collections::HashMap, io, net::SocketAddr, sync::Arc};

use comms::{
    ActorAddr, FrameReceiver, FrameSender,
    msg::{Command, Msg, Payload},
};
use log::{debug, info, warn};
use machine_learning::arch::GradientBatch;
use parking_lot::Mutex;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, ToSocketAddrs},
};

use crate::{AggregatorErr, AggregatorHandle, Result};

/// Builds a new aggregator the first time a peer connects to the name it's registered under.
pub type Factory = Box<dyn Fn() -> Result<AggregatorHandle> + Send + Sync>;

#[derive(Default)]
struct Registry {
    factories: Mutex<HashMap<String, Factory>>,
    actors: Mutex<HashMap<String, AggregatorHandle>>,
}

impl Registry {
    /// Finds the running actor registered as `name`, spawning it from its factory if needed.
    fn resolve(&self, name: &str) -> Result<AggregatorHandle> {
        let mut actors = self.actors.lock();
        if let Some(handle) = actors.get(name)
            && !handle.is_closed()
        {
            return Ok(handle.clone());
        }

        let factories = self.factories.lock();
        let factory = factories
            .get(name)
            .ok_or_else(|| AggregatorErr::UnknownActor(name.to_string()))?;

        let handle = factory()?;
        info!(name = name; "spawned actor from its factory");
        actors.insert(name.to_string(), handle.clone());
        Ok(handle)
    }
}

/// A network endpoint that exposes named aggregators to remote peers.
///
/// Peers open a connection, name the actor they want to talk to and then exchange
/// requests with it until they disconnect.
pub struct Node {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Node {
    /// Binds a new `Node` to `addr`.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            registry: Arc::default(),
        })
    }

    /// Returns the socket address the node is listening at.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns the address under which peers can reach the actor called `name`.
    pub fn addr_of(&self, name: &str) -> io::Result<ActorAddr> {
        Ok(ActorAddr::new(self.local_addr()?.to_string(), name))
    }

    /// Exposes an already running aggregator under `name`.
    pub fn insert(&self, name: impl Into<String>, handle: AggregatorHandle) {
        self.registry.actors.lock().insert(name.into(), handle);
    }

    /// Registers a factory that spawns the actor called `name` on first use.
    pub fn register(&self, name: impl Into<String>, factory: Factory) {
        self.registry.factories.lock().insert(name.into(), factory);
    }

    /// Accepts connections forever, serving each one in its own task.
    pub async fn serve(self) -> io::Result<()> {
        info!("node listening at {}", self.local_addr()?);

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let (rx, tx) = stream.into_split();
            let (rx, tx) = comms::channel(rx, tx);
            let registry = Arc::clone(&self.registry);

            tokio::spawn(async move {
                debug!("peer connected from {peer}");
                if let Err(e) = serve_peer(&registry, rx, tx).await {
                    warn!("connection with {peer} failed: {e}");
                }
            });
        }
    }
}

async fn serve_peer<R, W>(
    registry: &Registry,
    mut rx: FrameReceiver<R>,
    mut tx: FrameSender<W>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let handle = match rx.recv().await? {
        Msg::Control(Command::Connect { name }) => match registry.resolve(&name) {
            Ok(handle) => {
                tx.send(&Msg::Control(Command::Connected)).await?;
                handle
            }
            Err(e) => return tx.send(&Msg::Err(e.to_string())).await,
        },
        msg => {
            let detail = format!("expected a connect command, got {}", msg.kind());
            return tx.send(&Msg::Err(detail)).await;
        }
    };

    loop {
        let msg = match rx.recv().await {
            Ok(msg) => msg,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        let reply = match msg {
            Msg::Control(Command::GetGlobalWeights) => match handle.get_global_weights().await {
                Ok(snapshot) => Msg::Data(Payload::from(&snapshot)),
                Err(e) => Msg::Err(e.to_string()),
            },
            Msg::Data(Payload::Gradient { batch_size, layers }) => {
                apply_gradient(&handle, batch_size, layers).await
            }
            Msg::Control(Command::Disconnect) => return Ok(()),
            msg => Msg::Err(format!("unexpected {} message", msg.kind())),
        };

        tx.send(&reply).await?;
    }
}

async fn apply_gradient(
    handle: &AggregatorHandle,
    batch_size: usize,
    layers: Vec<comms::msg::LayerParams>,
) -> Msg {
    let res = match GradientBatch::from_params(batch_size, layers) {
        Ok(batch) => handle.apply_gradient(batch).await,
        Err(e) => Err(e.into()),
    };

    match res {
        Ok(()) => Msg::Control(Command::Ack),
        Err(AggregatorErr::Model(e)) if e.is_shape_mismatch() => {
            Msg::Control(Command::IncompatibleShape {
                detail: e.to_string(),
            })
        }
        Err(e) => Msg::Err(e.to_string()),
    }
}
