use std::{io, sync::Arc};

use comms::{
    FrameReceiver, FrameSender,
    msg::{Command, Msg},
    specs::session::SessionId,
};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};

use crate::{Result, Runtime};

/// Serves the session control commands of `runtime` to every peer that connects to
/// `listener`.
pub async fn serve(listener: TcpListener, runtime: Arc<Runtime>) -> io::Result<()> {
    info!("control endpoint listening at {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        let runtime = Arc::clone(&runtime);

        tokio::spawn(async move {
            debug!("controller connected from {peer}");
            if let Err(e) = serve_controller(&runtime, rx, tx).await {
                warn!("connection with {peer} failed: {e}");
            }
        });
    }
}

/// Answers the commands of a single peer until it disconnects.
///
/// # Arguments
/// * `runtime` - The runtime the commands act on.
/// * `rx` - The receiving end of the communication.
/// * `tx` - The sending end of the communication.
pub async fn serve_controller<R, W>(
    runtime: &Runtime,
    mut rx: FrameReceiver<R>,
    mut tx: FrameSender<W>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let msg = match rx.recv().await {
            Ok(msg) => msg,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        let reply = match msg {
            Msg::Control(Command::StartTraining { aggregator }) => {
                started(runtime.start_training(aggregator).await)
            }
            Msg::Control(Command::StartEvaluation { aggregator }) => {
                started(runtime.start_evaluation(aggregator).await)
            }
            Msg::Control(Command::QueryStatus { id }) => match runtime.status(id) {
                Ok(status) => Msg::Control(Command::Status { id, status }),
                Err(_) => Msg::Control(Command::UnknownSession { id }),
            },
            Msg::Control(Command::Disconnect) => return Ok(()),
            msg => Msg::Err(format!("unexpected {} message", msg.kind())),
        };

        tx.send(&reply).await?;
    }
}

fn started(res: Result<SessionId>) -> Msg {
    match res {
        Ok(id) => Msg::Control(Command::SessionStarted { id }),
        Err(e) => Msg::Err(e.to_string()),
    }
}
