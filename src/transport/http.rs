//! One-shot HTTP adapter: `GET /pfodWeb?cmd=<dedup><command>`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::collector::{Direction, MessageCollector};
use crate::config::Protocol;
use crate::dedup::DedupSequencer;
use crate::error::{PfodError, Result};
use crate::protocol::split_response;

/// Request path served by pfod HTTP devices.
pub const PFOD_WEB_PATH: &str = "/pfodWeb";

struct InFlight {
    generation: u64,
    cancel: oneshot::Sender<()>,
}

struct State {
    dedup: DedupSequencer,
    in_flight: Option<InFlight>,
    next_generation: u64,
}

/// Clears the in-flight slot when `send` finishes or its future is dropped.
struct InFlightGuard<'a> {
    state: &'a Mutex<State>,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == self.generation)
        {
            state.in_flight = None;
        }
    }
}

/// Request/response over plain HTTP. Always "connected".
pub struct HttpAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    collector: Option<Arc<MessageCollector>>,
    state: Mutex<State>,
}

impl HttpAdapter {
    /// `target` is `host[:port]` or a base URL with a scheme.
    pub fn new(
        target: &str,
        timeout: Duration,
        collector: Option<Arc<MessageCollector>>,
    ) -> Result<Self> {
        let base_url = base_url(target)?;
        let client = reqwest::Client::builder().build()?;
        tracing::debug!(
            %base_url,
            timeout_ms = timeout.as_millis() as u64,
            "HTTP adapter created"
        );
        Ok(Self {
            client,
            base_url,
            timeout,
            collector,
            state: Mutex::new(State {
                dedup: DedupSequencer::new(),
                in_flight: None,
                next_generation: 0,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn connect(&self) -> Result<()> {
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        true
    }

    /// Dedup character the next send will use.
    pub fn next_dedup(&self) -> char {
        self.state.lock().dedup.current()
    }

    fn record(&self, direction: Direction, message: &str, cmd: Option<&str>) {
        if let Some(collector) = &self.collector {
            collector.add_message(direction, message, Protocol::Http, cmd);
        }
    }

    /// Send `command` and return the response frame.
    ///
    /// A body without a complete frame is returned whole. A send still in
    /// flight on this adapter is cancelled with [`PfodError::Superseded`].
    pub async fn send(&self, command: &str) -> Result<String> {
        let (cancel, cancelled) = oneshot::channel();
        let (generation, dedup) = {
            let mut state = self.state.lock();
            if let Some(previous) = state.in_flight.take() {
                tracing::warn!("send() called while previous HTTP request still pending");
                let _ = previous.cancel.send(());
            }
            let generation = state.next_generation;
            state.next_generation += 1;
            state.in_flight = Some(InFlight { generation, cancel });
            (generation, state.dedup.current())
        };
        let guard = InFlightGuard {
            state: &self.state,
            generation,
        };

        let prefixed = format!("{}{}", dedup, command);
        let url = format!("{}{}", self.base_url, PFOD_WEB_PATH);
        tracing::debug!(
            %url,
            %dedup,
            command,
            timeout_ms = self.timeout.as_millis() as u64,
            "Sending HTTP request"
        );
        self.record(Direction::Sent, &prefixed, Some(command));

        let request = self.client.get(&url).query(&[("cmd", prefixed.as_str())]);
        let outcome = tokio::select! {
            result = tokio::time::timeout(self.timeout, fetch(request)) => Some(result),
            _ = cancelled => None,
        };

        drop(guard);

        let body = match outcome {
            None => return Err(PfodError::Superseded),
            Some(Err(_)) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    command,
                    "HTTP response timeout"
                );
                return Err(PfodError::Timeout {
                    protocol: Protocol::Http,
                    after: self.timeout,
                    first_call: false,
                });
            }
            Some(Ok(result)) => result?,
        };

        self.state.lock().dedup.advance();
        Ok(self.report_body(body, command))
    }

    /// Report a body to the collector and pick out the frame.
    fn report_body(&self, body: String, command: &str) -> String {
        let parts = split_response(&body);
        let Some(frame) = parts.frame else {
            if !body.trim().is_empty() {
                self.record(Direction::Received, &body, Some(command));
            }
            tracing::debug!(len = body.len(), "HTTP body without a complete frame");
            return body;
        };

        if !parts.before.trim().is_empty() {
            self.record(Direction::Received, parts.before, Some(command));
        }
        self.record(Direction::Received, frame, Some(command));
        if !parts.after.trim().is_empty() {
            self.record(Direction::Received, parts.after, Some(command));
        }
        tracing::debug!(len = frame.len(), "Received HTTP response frame");
        frame.to_string()
    }
}

impl std::fmt::Debug for HttpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAdapter")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

async fn fetch(request: reqwest::RequestBuilder) -> Result<String> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PfodError::HttpStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        });
    }
    Ok(response.text().await?)
}

fn base_url(target: &str) -> Result<String> {
    let target = target.trim().trim_end_matches('/');
    if target.is_empty() {
        return Err(PfodError::InvalidConfig("HTTP target address is empty".into()));
    }
    if target.contains("://") {
        Ok(target.to_string())
    } else {
        Ok(format!("http://{}", target))
    }
}
