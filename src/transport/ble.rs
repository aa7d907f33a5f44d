//! BLE UART links.
//!
//! The crate does not talk to a Bluetooth stack directly. The host supplies a
//! [`BleCentral`] that selects a device exposing the Nordic UART service and
//! returns it as a [`GattUart`]. [`BleConnector`] turns that into a byte
//! [`Link`]: notifications from the RX characteristic become the read half,
//! and bytes written to the write half go to the TX characteristic.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use super::link::{BoxFuture, Link, LinkConnector};
use crate::config::BleSettings;
use crate::error::Result;

/// Nordic UART service.
pub const UART_SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// Host-to-device characteristic (write).
pub const UART_TX_CHARACTERISTIC_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// Device-to-host characteristic (notify).
pub const UART_RX_CHARACTERISTIC_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

const PUMP_BUFFER_SIZE: usize = 512;

/// A connected GATT peripheral exposing the UART service.
pub trait GattUart: Send + Sync {
    /// Advertised name, or the platform id when unnamed.
    fn name(&self) -> String;

    /// Start notifications on `characteristic`; each value arrives as one chunk.
    fn subscribe(&self, characteristic: &'static str) -> BoxFuture<'_, Result<mpsc::Receiver<Bytes>>>;

    /// Write one value to `characteristic`.
    fn write(&self, characteristic: &'static str, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Stop notifications and drop the GATT connection.
    fn disconnect(&self) -> BoxFuture<'_, Result<()>>;
}

/// Device selection, provided by the host (scan, picker dialog, ...).
///
/// Implementations should filter on `service` and return
/// [`PfodError::LinkSelection`](crate::PfodError::LinkSelection) when the
/// user cancels or no device is found.
pub trait BleCentral: Send + Sync {
    fn select_device<'a>(
        &'a self,
        service: &'static str,
        hint: &'a BleSettings,
    ) -> BoxFuture<'a, Result<Arc<dyn GattUart>>>;
}

/// Opens a BLE UART link through a host [`BleCentral`].
pub struct BleConnector {
    central: Arc<dyn BleCentral>,
    settings: BleSettings,
}

impl BleConnector {
    pub fn new(central: Arc<dyn BleCentral>, settings: BleSettings) -> Self {
        Self { central, settings }
    }
}

impl std::fmt::Debug for BleConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleConnector")
            .field("settings", &self.settings)
            .finish()
    }
}

impl LinkConnector for BleConnector {
    fn open(&self) -> BoxFuture<'_, Result<Link>> {
        Box::pin(async move {
            let device = self
                .central
                .select_device(UART_SERVICE_UUID, &self.settings)
                .await?;
            let name = device.name();

            let notifications = device.subscribe(UART_RX_CHARACTERISTIC_UUID).await?;
            tracing::info!(device = %name, "BLE UART notifications started");

            let (ours, theirs) = tokio::io::duplex(PUMP_BUFFER_SIZE * 4);
            let (pump_reader, pump_writer) = tokio::io::split(theirs);

            tokio::spawn(inbound_pump(notifications, pump_writer));
            tokio::spawn(outbound_pump(device, pump_reader));

            Ok(Link::from_stream(name, ours))
        })
    }
}

/// RX notifications -> link read half. Ends when the device stops notifying
/// or the link is dropped.
async fn inbound_pump<W>(mut notifications: mpsc::Receiver<Bytes>, mut link: W)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(chunk) = notifications.recv().await {
        if link.write_all(&chunk).await.is_err() {
            break;
        }
    }
    let _ = link.shutdown().await;
    tracing::debug!("BLE inbound pump stopped");
}

/// Link write half -> TX writes. On EOF the GATT connection is closed.
async fn outbound_pump<R>(device: Arc<dyn GattUart>, mut link: R)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
    loop {
        match link.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let data = Bytes::copy_from_slice(&buf[..n]);
                if let Err(e) = device.write(UART_TX_CHARACTERISTIC_UUID, data).await {
                    tracing::warn!(error = %e, "BLE write failed");
                    break;
                }
            }
        }
    }

    if let Err(e) = device.disconnect().await {
        tracing::warn!(error = %e, "BLE disconnect failed");
    }
    tracing::debug!(device = %device.name(), "BLE outbound pump stopped");
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory BLE peripheral for tests.

    use super::*;
    use crate::error::PfodError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub struct FakeUart {
        pub name: String,
        pub written: mpsc::UnboundedSender<(String, Bytes)>,
        pub notify: Mutex<Option<mpsc::Receiver<Bytes>>>,
        pub disconnected: AtomicBool,
    }

    impl GattUart for FakeUart {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn subscribe(&self, characteristic: &'static str) -> BoxFuture<'_, Result<mpsc::Receiver<Bytes>>> {
            Box::pin(async move {
                assert_eq!(characteristic, UART_RX_CHARACTERISTIC_UUID);
                self.notify
                    .lock()
                    .take()
                    .ok_or_else(|| PfodError::LinkSelection("already subscribed".into()))
            })
        }

        fn write(&self, characteristic: &'static str, data: Bytes) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.written
                    .send((characteristic.to_string(), data))
                    .map_err(|_| PfodError::ConnectionClosed)
            })
        }

        fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.disconnected.store(true, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    pub struct FakeCentral {
        pub device: Mutex<Option<Arc<FakeUart>>>,
    }

    impl BleCentral for FakeCentral {
        fn select_device<'a>(
            &'a self,
            service: &'static str,
            _hint: &'a BleSettings,
        ) -> BoxFuture<'a, Result<Arc<dyn GattUart>>> {
            Box::pin(async move {
                assert_eq!(service, UART_SERVICE_UUID);
                match self.device.lock().take() {
                    Some(device) => Ok(device as Arc<dyn GattUart>),
                    None => Err(PfodError::LinkSelection("No BLE device selected".into())),
                }
            })
        }
    }

    /// A central with one device. Returns the device, the notify sender and
    /// the receiver of everything written to it.
    pub fn central(
        name: &str,
    ) -> (
        Arc<FakeCentral>,
        Arc<FakeUart>,
        mpsc::Sender<Bytes>,
        mpsc::UnboundedReceiver<(String, Bytes)>,
    ) {
        let (notify_tx, notify_rx) = mpsc::channel(16);
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        let device = Arc::new(FakeUart {
            name: name.to_string(),
            written: written_tx,
            notify: Mutex::new(Some(notify_rx)),
            disconnected: AtomicBool::new(false),
        });
        let central = Arc::new(FakeCentral {
            device: Mutex::new(Some(device.clone())),
        });
        (central, device, notify_tx, written_rx)
    }
}
