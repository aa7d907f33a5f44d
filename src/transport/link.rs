//! Byte links behind the streaming adapters.
//!
//! A [`LinkConnector`] performs the one-time selection and open of a physical
//! link and hands back a [`Link`]: a boxed read half and write half. The
//! streaming adapter does not care whether the bytes come from a UART, a TCP
//! serial bridge, a BLE UART service or an in-memory duplex in tests.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::SerialSettings;
use crate::error::{PfodError, Result};

/// Type alias for boxed futures returned by connectors.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Boxed read half of a link.
pub type LinkReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a link.
pub type LinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open byte link.
pub struct Link {
    /// Human-readable name for logs (`/dev/ttyUSB0`, `pfodDevice`, ...).
    pub name: String,
    pub reader: LinkReader,
    pub writer: LinkWriter,
}

impl Link {
    /// Build a link from separate halves.
    pub fn new<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            name: name.into(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Split a bidirectional stream into a link.
    pub fn from_stream<S>(name: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(name, reader, writer)
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").field("name", &self.name).finish()
    }
}

/// Opens a link on `connect()`.
///
/// Called once per connect; the returned link lives until `disconnect()` or
/// until its read half reports EOF.
pub trait LinkConnector: Send + Sync {
    fn open(&self) -> BoxFuture<'_, Result<Link>>;
}

/// Serial-over-TCP bridge (`ser2net`, ESP-Link, a socat pty bridge).
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    /// `address` is `host:port`, with or without a `tcp://` prefix.
    pub fn new(address: impl AsRef<str>) -> Self {
        let address = address.as_ref();
        let address = address.strip_prefix("tcp://").unwrap_or(address);
        Self {
            address: address.to_string(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl LinkConnector for TcpConnector {
    fn open(&self) -> BoxFuture<'_, Result<Link>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.address).await.map_err(|e| {
                PfodError::LinkSelection(format!(
                    "Could not open serial bridge at {}: {}",
                    self.address, e
                ))
            })?;
            stream.set_nodelay(true)?;
            tracing::debug!(address = %self.address, "Serial bridge connected");
            Ok(Link::from_stream(format!("tcp://{}", self.address), stream))
        })
    }
}

/// Pick a connector for serial settings when the host did not inject one.
///
/// `tcp://` ports use [`TcpConnector`]; anything else needs the `serial`
/// feature.
pub(crate) fn default_serial_connector(
    settings: &SerialSettings,
) -> Result<std::sync::Arc<dyn LinkConnector>> {
    let Some(port) = settings.port.as_deref() else {
        return Err(PfodError::LinkSelection(
            "No serial port selected. Set serial.port to a device path or tcp://host:port".into(),
        ));
    };

    if port.starts_with("tcp://") {
        return Ok(std::sync::Arc::new(TcpConnector::new(port)));
    }

    #[cfg(feature = "serial")]
    {
        Ok(std::sync::Arc::new(super::serial::SerialPortConnector::new(
            settings.clone(),
        )))
    }

    #[cfg(not(feature = "serial"))]
    {
        Err(PfodError::Unsupported(format!(
            "Native serial port {} requires the `serial` feature. Use a tcp:// bridge or rebuild with --features serial",
            port
        )))
    }
}
