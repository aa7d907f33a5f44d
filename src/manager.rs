//! Connection manager: one configured transport behind one API.
//!
//! The [`ConnectionManagerBuilder`] resolves the configured [`Protocol`] to an
//! adapter once, at build time. The [`ConnectionManager`] then forwards
//! `send`/`connect`/`disconnect` to it and exposes the timeout and retry
//! policy for callers that drive their own retry loop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pfod_link::{ConnectionConfig, ConnectionManager, MessageCollector};
//!
//! # async fn run() -> pfod_link::Result<()> {
//! let collector = Arc::new(MessageCollector::new());
//! let manager = ConnectionManager::builder(ConnectionConfig::http("192.168.1.20"))
//!     .collector(collector.clone())
//!     .build()?;
//!
//! let menu = manager.send_with_retries("{.}").await?;
//! println!("{menu}");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::collector::{ChunkObserver, MessageCollector};
use crate::config::{ConnectionConfig, Protocol};
use crate::error::{PfodError, Result};
use crate::policy::{response_timeout, RetryPolicy, TimeoutPolicy};
use crate::transport::{
    default_serial_connector, BleCentral, BleConnector, HttpAdapter, LinkConnector, StreamAdapter,
};

enum Adapter {
    Http(HttpAdapter),
    Stream(StreamAdapter),
}

/// Builder for a [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    config: ConnectionConfig,
    collector: Option<Arc<MessageCollector>>,
    connector: Option<Arc<dyn LinkConnector>>,
    ble_central: Option<Arc<dyn BleCentral>>,
    observers: Vec<Arc<dyn ChunkObserver>>,
}

impl ConnectionManagerBuilder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            collector: None,
            connector: None,
            ble_central: None,
            observers: Vec::new(),
        }
    }

    /// Log every sent and received message to `collector`.
    pub fn collector(mut self, collector: Arc<MessageCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Use `connector` for streaming links instead of the one derived from
    /// the configuration.
    pub fn connector(mut self, connector: Arc<dyn LinkConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Host BLE stack used to select a device on `connect()`.
    pub fn ble_central(mut self, central: Arc<dyn BleCentral>) -> Self {
        self.ble_central = Some(central);
        self
    }

    /// Feed every received chunk to `observer` (streaming links only).
    pub fn observer(mut self, observer: Arc<dyn ChunkObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Resolve the adapter.
    ///
    /// Fails when the configuration names no usable target: a missing HTTP
    /// address, a native serial port without the `serial` feature, or BLE
    /// without a connector or central.
    pub fn build(self) -> Result<ConnectionManager> {
        let protocol = self.config.protocol;
        let timeout = response_timeout(self.config.response_timeout_secs);

        let adapter = match protocol {
            Protocol::Http => {
                let target = self.config.target_address.as_deref().ok_or_else(|| {
                    PfodError::InvalidConfig("HTTP requires target_address".into())
                })?;
                Adapter::Http(HttpAdapter::new(target, timeout, self.collector.clone())?)
            }
            Protocol::Serial | Protocol::Ble => {
                let connector: Arc<dyn LinkConnector> = match (self.connector, protocol) {
                    (Some(connector), _) => connector,
                    (None, Protocol::Serial) => default_serial_connector(&self.config.serial)?,
                    (None, _) => {
                        let central = self.ble_central.ok_or_else(|| {
                            PfodError::Unsupported(
                                "BLE needs a Bluetooth central from the host application".into(),
                            )
                        })?;
                        Arc::new(BleConnector::new(central, self.config.ble.clone()))
                    }
                };
                Adapter::Stream(StreamAdapter::new(
                    protocol,
                    connector,
                    TimeoutPolicy::for_protocol(protocol, timeout),
                    self.collector.clone(),
                    self.observers,
                ))
            }
        };

        tracing::info!(
            %protocol,
            timeout_ms = timeout.as_millis() as u64,
            max_retries = RetryPolicy::max_retries(protocol),
            "Connection manager created"
        );

        Ok(ConnectionManager {
            config: self.config,
            timeout,
            adapter,
            collector: self.collector,
        })
    }
}

/// One device connection.
pub struct ConnectionManager {
    config: ConnectionConfig,
    timeout: Duration,
    adapter: Adapter,
    collector: Option<Arc<MessageCollector>>,
}

impl ConnectionManager {
    pub fn builder(config: ConnectionConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(config)
    }

    /// Build with no collector, observers or injected connector.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn collector(&self) -> Option<&Arc<MessageCollector>> {
        self.collector.as_ref()
    }

    /// Effective response deadline after clamping.
    pub fn response_timeout(&self) -> Duration {
        self.timeout
    }

    /// How many times a caller should resubmit after a timeout.
    pub fn max_retries(&self) -> u32 {
        RetryPolicy::max_retries(self.config.protocol)
    }

    /// Name used to key cached responses for this device.
    pub fn connection_identity(&self) -> String {
        self.config.connection_identity()
    }

    /// Dedup character the next send will use.
    pub fn next_dedup(&self) -> char {
        match &self.adapter {
            Adapter::Http(http) => http.next_dedup(),
            Adapter::Stream(stream) => stream.next_dedup(),
        }
    }

    pub async fn connect(&self) -> Result<()> {
        match &self.adapter {
            Adapter::Http(http) => http.connect().await,
            Adapter::Stream(stream) => stream.connect().await,
        }
    }

    pub async fn disconnect(&self) -> Result<()> {
        match &self.adapter {
            Adapter::Http(http) => http.disconnect().await,
            Adapter::Stream(stream) => stream.disconnect().await,
        }
    }

    pub fn is_connected(&self) -> bool {
        match &self.adapter {
            Adapter::Http(http) => http.is_connected(),
            Adapter::Stream(stream) => stream.is_connected(),
        }
    }

    /// Send one command and return the response frame. No retries.
    pub async fn send(&self, command: &str) -> Result<String> {
        match &self.adapter {
            Adapter::Http(http) => http.send(command).await,
            Adapter::Stream(stream) => stream.send(command).await,
        }
    }

    /// [`send`](Self::send), resubmitting up to [`max_retries`](Self::max_retries)
    /// times after a timeout. Other errors return immediately.
    ///
    /// Resubmissions reuse the dedup character, so a device that did act on
    /// a lost-response attempt ignores the repeat.
    pub async fn send_with_retries(&self, command: &str) -> Result<String> {
        let max_retries = self.max_retries();
        let mut attempt = 0;
        loop {
            match self.send(command).await {
                Err(e) if e.is_timeout() && attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        protocol = %self.protocol(),
                        attempt,
                        max_retries,
                        dedup = %self.next_dedup(),
                        "Retrying after timeout"
                    );
                }
                Err(e) => {
                    if e.is_timeout() && max_retries > 0 {
                        tracing::error!(
                            protocol = %self.protocol(),
                            attempts = attempt + 1,
                            "All attempts timed out"
                        );
                    }
                    return Err(e);
                }
                Ok(response) => return Ok(response),
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("protocol", &self.config.protocol)
            .field("timeout", &self.timeout)
            .field("connected", &self.is_connected())
            .finish()
    }
}
