use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::LinkError;

/// Outcome of a read that may legitimately end before filling the buffer.
pub(crate) enum ReadOutcome {
    Complete,
    /// Stream ended with zero bytes consumed: a clean close at a frame
    /// boundary.
    CleanEof,
    /// Stream ended after some bytes were read: a truncated frame.
    Truncated,
}

/// A stream connection shared between the Link's public send methods and its
/// reader task. Each half is boxed behind its own mutex so a Link can wrap a
/// TCP stream, a Unix stream, or a Unix stream built from a raw fd (the
/// Hub-to-child socketpair) uniformly.
#[derive(Clone)]
pub(crate) struct Conn {
    inner: Arc<Inner>,
}

struct Inner {
    reader: AsyncMutex<Box<dyn AsyncRead + Unpin + Send>>,
    writer: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send>>,
    closed: AtomicBool,
}

impl Conn {
    pub(crate) fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            inner: Arc::new(Inner {
                reader: AsyncMutex::new(Box::new(reader)),
                writer: AsyncMutex::new(Box::new(writer)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub(crate) async fn read_exact(&self, buf: &mut [u8]) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        let mut reader = self.inner.reader.lock().await;
        reader.read_exact(buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                LinkError::Truncated
            } else {
                LinkError::Io(e)
            }
        })
    }

    /// Like `read_exact`, but distinguishes a clean end-of-stream (zero
    /// bytes read) from a frame truncated partway through.
    pub(crate) async fn try_read_exact(&self, buf: &mut [u8]) -> Result<ReadOutcome, LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        if buf.is_empty() {
            return Ok(ReadOutcome::Complete);
        }
        let mut reader = self.inner.reader.lock().await;
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]).await {
                Ok(0) => {
                    return Ok(if filled == 0 {
                        ReadOutcome::CleanEof
                    } else {
                        ReadOutcome::Truncated
                    });
                }
                Ok(n) => filled += n,
                Err(e) => return Err(LinkError::Io(e)),
            }
        }
        Ok(ReadOutcome::Complete)
    }

    /// Read whatever is immediately available, up to `buf.len()` bytes.
    /// Zero means end-of-stream. Used by the text-mode receive loop, which
    /// buffers and parses by delimiter rather than assuming one read is one
    /// logical packet.
    pub(crate) async fn read_some(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        let mut reader = self.inner.reader.lock().await;
        reader.read(buf).await.map_err(LinkError::from)
    }

    pub(crate) async fn write_all(&self, buf: &[u8]) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(buf).await?;
        writer.flush().await?;
        Ok(())
    }
}
