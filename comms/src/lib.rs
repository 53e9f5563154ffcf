//! The framed wire protocol spoken between controllers, coordinators, workers and
//! aggregators.

mod addr;
mod deserialize;
pub mod error;
mod frame;
pub mod msg;
mod receiver;
mod sender;
mod serialize;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use addr::ActorAddr;
pub use deserialize::Deserialize;
pub use error::{RpcErr, RpcResult, bounded};
pub use receiver::FrameReceiver;
pub use sender::FrameSender;
pub use serialize::Serialize;

/// Wraps both halves of a stream into a framed channel.
///
/// # Arguments
/// * `rx` - The reading half.
/// * `tx` - The writing half.
pub fn channel<R, W>(rx: R, tx: W) -> (FrameReceiver<R>, FrameSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (FrameReceiver::new(rx), FrameSender::new(tx))
}
