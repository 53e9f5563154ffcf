use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    Deserialize,
    frame::{self, HEADER_LEN},
};

/// Reads length-prefixed frames from an async reader.
pub struct FrameReceiver<R> {
    rx: R,
    body: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    pub(crate) fn new(rx: R) -> Self {
        Self {
            rx,
            body: Vec::new(),
        }
    }

    /// Waits for the next frame and decodes its body.
    ///
    /// # Errors
    /// `io::ErrorKind::UnexpectedEof` once the peer closed the stream, `InvalidData` for
    /// oversized or malformed frames.
    pub async fn recv<T: Deserialize>(&mut self) -> io::Result<T> {
        let mut header = [0; HEADER_LEN];
        self.rx.read_exact(&mut header).await?;
        let len = frame::decode_header(header)?;

        self.body.resize(len, 0);
        self.rx.read_exact(&mut self.body).await?;

        T::deserialize(&self.body)
    }
}
