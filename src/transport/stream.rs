//! Streaming adapter shared by the serial and BLE transports.
//!
//! One connection runs two tasks between `connect()` and `disconnect()`:
//!
//! ```text
//! send() ─► WriterHandle ─► writer task ─► link write half
//!   ▲
//!   │ oneshot (pending slot)
//!   │
//! read task ◄── link read half      (owns the FrameBuffer)
//! ```
//!
//! The read task is the only owner of the [`FrameBuffer`]. It resolves the
//! single pending call when a frame completes; the caller races that against
//! its deadline, and whoever takes the pending slot first decides the outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::link::{Link, LinkConnector, LinkReader};
use crate::collector::{ChunkObserver, Direction, MessageCollector};
use crate::config::Protocol;
use crate::dedup::DedupSequencer;
use crate::error::{PfodError, Result};
use crate::policy::TimeoutPolicy;
use crate::protocol::{encode_command, Extracted, FrameBuffer};
use crate::writer::{spawn_writer_task, WriterHandle};

const READ_BUFFER_SIZE: usize = 1024;

/// A call waiting for its response frame.
struct PendingRequest {
    id: u64,
    command: String,
    tx: oneshot::Sender<Result<String>>,
}

struct State {
    connected: bool,
    /// Set on connect, taken by the first send.
    first_call: bool,
    dedup: DedupSequencer,
    pending: Option<PendingRequest>,
}

/// State shared between callers and the read task.
struct Shared {
    protocol: Protocol,
    collector: Option<Arc<MessageCollector>>,
    observers: Vec<Arc<dyn ChunkObserver>>,
    state: Mutex<State>,
    /// Pinged on every received chunk.
    activity: Notify,
}

impl Shared {
    fn record(&self, direction: Direction, message: &str, cmd: Option<&str>) {
        if let Some(collector) = &self.collector {
            collector.add_message(direction, message, self.protocol, cmd);
        }
    }

    fn on_chunk(&self, frames: &mut FrameBuffer, chunk: &[u8]) {
        self.activity.notify_waiters();

        let text = frames.decode(chunk);
        if text.is_empty() {
            return;
        }
        for observer in &self.observers {
            observer.process_chars(&text);
        }

        for unit in frames.push_str(&text) {
            match unit {
                Extracted::Raw(raw) => self.record(Direction::Received, &raw, None),
                Extracted::Frame(frame) => self.complete(frame),
            }
        }
    }

    /// Hand a completed frame to the pending call, if any.
    fn complete(&self, frame: String) {
        let pending = {
            let mut state = self.state.lock();
            let pending = state.pending.take();
            if pending.is_some() {
                state.dedup.advance();
            }
            pending
        };

        match pending {
            Some(pending) => {
                self.record(Direction::Received, &frame, Some(&pending.command));
                tracing::debug!(
                    protocol = %self.protocol,
                    command = %pending.command,
                    len = frame.len(),
                    "Received response frame"
                );
                let _ = pending.tx.send(Ok(frame));
            }
            None => {
                self.record(Direction::Received, &frame, None);
                tracing::debug!(protocol = %self.protocol, %frame, "Unsolicited frame");
            }
        }
    }

    /// Remove the pending call if it is still `id`. Returns true if removed.
    fn take_pending(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        if state.pending.as_ref().is_some_and(|p| p.id == id) {
            state.pending = None;
            true
        } else {
            false
        }
    }

    fn on_link_closed(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.connected = false;
            state.pending.take()
        };
        if let Some(pending) = pending {
            tracing::warn!(
                protocol = %self.protocol,
                command = %pending.command,
                "Link closed with a request pending"
            );
            let _ = pending.tx.send(Err(PfodError::ConnectionClosed));
        }
    }
}

/// Clears the pending slot if the `send` future is dropped mid-flight.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.take_pending(self.id);
    }
}

struct Session {
    link_name: String,
    writer: WriterHandle,
    writer_task: JoinHandle<Result<()>>,
    read_task: JoinHandle<()>,
}

/// Request/response over a persistent byte link.
pub struct StreamAdapter {
    connector: Arc<dyn LinkConnector>,
    timeouts: TimeoutPolicy,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
    connect_lock: tokio::sync::Mutex<()>,
    next_request: AtomicU64,
}

impl StreamAdapter {
    pub fn new(
        protocol: Protocol,
        connector: Arc<dyn LinkConnector>,
        timeouts: TimeoutPolicy,
        collector: Option<Arc<MessageCollector>>,
        observers: Vec<Arc<dyn ChunkObserver>>,
    ) -> Self {
        tracing::debug!(
            %protocol,
            timeout_ms = timeouts.steady.as_millis() as u64,
            first_call_ms = timeouts.first_call.map(|d| d.as_millis() as u64),
            "Streaming adapter created"
        );
        Self {
            connector,
            timeouts,
            shared: Arc::new(Shared {
                protocol,
                collector,
                observers,
                state: Mutex::new(State {
                    connected: false,
                    first_call: false,
                    dedup: DedupSequencer::new(),
                    pending: None,
                }),
                activity: Notify::new(),
            }),
            session: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            next_request: AtomicU64::new(0),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.shared.protocol
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    /// Dedup character the next send will use.
    pub fn next_dedup(&self) -> char {
        self.shared.state.lock().dedup.current()
    }

    /// Open the link and start the reader and writer tasks. No-op when
    /// already connected.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let protocol = self.shared.protocol;
        tracing::info!(%protocol, "Connecting");
        let Link {
            name,
            reader,
            writer,
        } = self.connector.open().await?;

        if let Some(stale) = self.session.lock().take() {
            stale.read_task.abort();
            stale.writer_task.abort();
        }

        let (writer, writer_task) = spawn_writer_task(writer);
        {
            let mut state = self.shared.state.lock();
            state.connected = true;
            state.first_call = self.timeouts.first_call.is_some();
        }
        let read_task = tokio::spawn(read_loop(reader, self.shared.clone()));

        tracing::info!(%protocol, link = %name, "Connected");
        *self.session.lock() = Some(Session {
            link_name: name,
            writer,
            writer_task,
            read_task,
        });
        Ok(())
    }

    /// Stop both tasks and close the link. A pending call fails with
    /// [`PfodError::ConnectionClosed`].
    pub async fn disconnect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        let session = self.session.lock().take();
        let Some(session) = session else {
            return Ok(());
        };

        session.read_task.abort();
        let _ = session.read_task.await;
        self.shared.on_link_closed();

        drop(session.writer);
        if let Ok(Err(e)) = session.writer_task.await {
            tracing::debug!(error = %e, "Writer ended with error");
        }
        tracing::info!(protocol = %self.shared.protocol, link = %session.link_name, "Disconnected");
        Ok(())
    }

    /// Send `command` and wait for the next frame.
    ///
    /// Connects first if needed. The deadline restarts whenever any data
    /// arrives. A call already pending is failed with
    /// [`PfodError::Superseded`].
    pub async fn send(&self, command: &str) -> Result<String> {
        let protocol = self.shared.protocol;
        if !self.is_connected() {
            tracing::info!(%protocol, "Not connected, connecting now");
            self.connect().await?;
        }

        let writer = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.writer.clone())
            .ok_or(PfodError::NotConnected)?;

        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = oneshot::channel();
        let (dedup, timeout, first_call) = {
            let mut state = self.shared.state.lock();
            if let Some(previous) = state.pending.take() {
                tracing::warn!(
                    %protocol,
                    previous = %previous.command,
                    "send() called while previous request still pending"
                );
                let _ = previous.tx.send(Err(PfodError::Superseded));
            }

            let first_call = std::mem::take(&mut state.first_call);
            let timeout = match (first_call, self.timeouts.first_call) {
                (true, Some(short)) => short,
                _ => self.timeouts.steady,
            };
            state.pending = Some(PendingRequest {
                id,
                command: command.to_string(),
                tx,
            });
            (state.dedup.current(), timeout, first_call)
        };
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        let mut deadline = Instant::now() + timeout;
        let line = encode_command(dedup, command, true);
        tracing::debug!(
            %protocol,
            %dedup,
            command,
            timeout_ms = timeout.as_millis() as u64,
            "Sending command"
        );
        self.shared.record(
            Direction::Sent,
            &format!("{}{}", dedup, command),
            Some(command),
        );
        if let Err(e) = writer.write(line).await {
            tracing::warn!(%protocol, error = %e, "Link write failed, dropping link");
            self.drop_session(&writer);
            return Err(e);
        }
        drop(writer);

        loop {
            tokio::select! {
                biased;

                result = &mut rx => {
                    return result.unwrap_or(Err(PfodError::ConnectionClosed));
                }
                _ = self.shared.activity.notified() => {
                    deadline = Instant::now() + timeout;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if self.shared.take_pending(id) {
                        return Err(self.timeout_error(timeout, first_call));
                    }
                    // The read task won the race
                    return rx.try_recv().unwrap_or(Err(PfodError::ConnectionClosed));
                }
            }
        }
    }

    /// Tear down the session owning `writer` so the next send reconnects.
    fn drop_session(&self, writer: &WriterHandle) {
        let session = {
            let mut slot = self.session.lock();
            match slot.as_ref() {
                Some(current) if current.writer.same_channel(writer) => slot.take(),
                _ => None,
            }
        };
        if let Some(session) = session {
            session.read_task.abort();
            session.writer_task.abort();
            self.shared.state.lock().connected = false;
        }
    }

    fn timeout_error(&self, after: Duration, first_call: bool) -> PfodError {
        let protocol = self.shared.protocol;
        let timeout_ms = after.as_millis() as u64;
        if first_call {
            tracing::warn!(
                %protocol,
                timeout_ms,
                steady_ms = self.timeouts.steady.as_millis() as u64,
                "First request timed out, retries use the full timeout"
            );
        } else {
            tracing::warn!(%protocol, timeout_ms, "Response timeout");
        }
        PfodError::Timeout {
            protocol,
            after,
            first_call,
        }
    }
}

impl std::fmt::Debug for StreamAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAdapter")
            .field("protocol", &self.shared.protocol)
            .field("timeouts", &self.timeouts)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for StreamAdapter {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.read_task.abort();
            session.writer_task.abort();
        }
    }
}

async fn read_loop(mut reader: LinkReader, shared: Arc<Shared>) {
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::info!(protocol = %shared.protocol, "Link closed by device");
                break;
            }
            Ok(n) => shared.on_chunk(&mut frames, &buf[..n]),
            Err(e) => {
                tracing::warn!(protocol = %shared.protocol, error = %e, "Link read failed");
                break;
            }
        }
    }

    if !frames.is_empty() {
        tracing::debug!(buffered = frames.len(), "Discarding incomplete frame");
    }
    shared.on_link_closed();
}
