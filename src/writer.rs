//! Dedicated writer task for a streaming link.
//!
//! Outbound command lines are handed to one task over an mpsc channel, so the
//! write half of the link has a single owner and callers never hold a lock
//! across an `.await` on the link.
//!
//! ```text
//! send() ─► WriterHandle ─► mpsc ─► writer task ─► link write half
//!    ▲                                   │
//!    └────────── oneshot ack ◄───────────┘
//! ```

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{PfodError, Result};

/// Queue depth. Sends are single-flight, so a few slots are plenty.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// An encoded command waiting to be written.
#[derive(Debug)]
pub struct OutboundLine {
    pub bytes: Bytes,
    /// Completed once the bytes are flushed, or with the write error.
    pub done: oneshot::Sender<Result<()>>,
}

/// Handle for submitting lines to the writer task.
///
/// Dropping every handle shuts the task down.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundLine>,
}

impl WriterHandle {
    /// Queue `bytes` and wait until they are flushed to the link.
    pub async fn write(&self, bytes: Bytes) -> Result<()> {
        let (done, ack) = oneshot::channel();
        self.tx
            .send(OutboundLine { bytes, done })
            .await
            .map_err(|_| PfodError::ConnectionClosed)?;
        ack.await.map_err(|_| PfodError::ConnectionClosed)?
    }

    /// True if both handles feed the same writer task.
    pub fn same_channel(&self, other: &WriterHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// True once the writer task has exited.
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task over `writer`.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundLine>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        let result = write_line(&mut writer, &line.bytes).await;
        match result {
            Ok(()) => {
                let _ = line.done.send(Ok(()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Link write failed, stopping writer");
                let _ = line.done.send(Err(PfodError::Io(std::io::Error::new(
                    e.kind(),
                    e.to_string(),
                ))));
                return Err(PfodError::Io(e));
            }
        }
    }

    // All handles dropped, clean shutdown
    let _ = writer.shutdown().await;
    Ok(())
}

async fn write_line<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_write_is_acked_after_flush() {
        let (client, mut server) = duplex(64);
        let (handle, _task) = spawn_writer_task(client);

        handle.write(Bytes::from_static(b"0{.}\n")).await.unwrap();

        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"0{.}\n");
    }

    #[tokio::test]
    async fn test_lines_keep_order() {
        let (client, mut server) = duplex(256);
        let (handle, _task) = spawn_writer_task(client);

        for cmd in ["0{a}\n", "1{b}\n", "2{c}\n"] {
            handle.write(Bytes::from(cmd)).await.unwrap();
        }

        let mut buf = vec![0u8; 15];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"0{a}\n1{b}\n2{c}\n");
    }

    #[tokio::test]
    async fn test_shutdown_on_handle_drop() {
        let (client, _server) = duplex(64);
        let (handle, task) = spawn_writer_task(client);

        drop(handle);

        assert!(task.await.unwrap().is_ok());
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_error_reaches_caller() {
        let (handle, task) = spawn_writer_task(BrokenPipe);

        let err = handle.write(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, PfodError::Io(_)));

        assert!(task.await.unwrap().is_err());
        assert!(handle.is_closed());
        assert!(matches!(
            handle.write(Bytes::from_static(b"y")).await,
            Err(PfodError::ConnectionClosed)
        ));
    }
}
