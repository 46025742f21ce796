//! Message-level I/O over a byte stream.
//!
//! [`FrameReader`] turns reads into whole messages; [`FrameWriter`] is a
//! cloneable handle that serialises sends and refuses them once closed.
//! Both are generic over tokio's I/O traits, so tests drive them with
//! `tokio_test::io` mocks instead of sockets.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::ProtocolError;
use crate::protocol::{encode_frame, FrameDecoder};

const READ_BUFFER_SIZE: usize = 4096;

pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    ready: VecDeque<Result<String, ProtocolError>>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        FrameReader {
            reader,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            buffer: vec![0; READ_BUFFER_SIZE],
        }
    }

    /// Next complete message, or `None` once the peer closed the stream.
    ///
    /// A frame over the length limit comes back as a malformed error and
    /// reading may continue after it. Cancel safe: a message is only
    /// removed from the queue when returned.
    pub async fn next_message(&mut self) -> Result<Option<String>, ProtocolError> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return message.map(Some);
            }
            let n = self.reader.read(&mut self.buffer).await?;
            if n == 0 {
                if self.decoder.pending_len() > 0 {
                    warn!(
                        "Stream closed with {} unterminated bytes",
                        self.decoder.pending_len()
                    );
                }
                return Ok(None);
            }
            self.ready.extend(self.decoder.push(&self.buffer[..n]));
        }
    }
}

pub struct FrameWriter<W> {
    inner: Arc<Mutex<Option<W>>>,
}

impl<W> Clone for FrameWriter<W> {
    fn clone(&self) -> Self {
        FrameWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        FrameWriter {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    /// Sends one framed message. A failed write closes the writer.
    pub async fn send(&self, message: &str) -> Result<(), ProtocolError> {
        let frame = encode_frame(message);
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(ProtocolError::Disconnected)?;
        let result = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!("Write failed, closing writer: {}", e);
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Shuts the stream down; later sends fail with `Disconnected`.
    pub async fn close(&self) {
        let writer = self.inner.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown failed: {}", e);
            }
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}
