use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    Serialize,
    frame::{self, HEADER_LEN},
};

/// Writes length-prefixed frames to an async writer.
pub struct FrameSender<W> {
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    pub(crate) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Encodes `msg` into a single frame and flushes it.
    ///
    /// # Errors
    /// `io::ErrorKind::InvalidData` if the encoded body is larger than a frame may be,
    /// otherwise whatever the writer fails with.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> io::Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(&[0; HEADER_LEN]);
        msg.serialize(&mut self.buf);

        let len = self.buf.len() - HEADER_LEN;
        frame::check_len(len)?;
        self.buf[..HEADER_LEN].copy_from_slice(&frame::encode_header(len));

        self.tx.write_all(&self.buf).await?;
        self.tx.flush().await
    }

    /// Closes the writing half, the peer reads an end of stream afterwards.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.tx.shutdown().await
    }
}
