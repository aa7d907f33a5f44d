//! Transport adapters and the links beneath them.
//!
//! - [`HttpAdapter`]: one request per command over plain HTTP
//! - [`StreamAdapter`]: persistent byte stream (serial, BLE)
//!
//! Streaming adapters get their bytes from a [`LinkConnector`]:
//! [`TcpConnector`] for serial bridges, `SerialPortConnector` for native
//! ports (`serial` feature) and [`BleConnector`] for BLE UART devices.

mod ble;
mod http;
mod link;
#[cfg(feature = "serial")]
mod serial;
mod stream;
#[cfg(test)]
pub(crate) mod testing;

pub use ble::{
    BleCentral, BleConnector, GattUart, UART_RX_CHARACTERISTIC_UUID, UART_SERVICE_UUID,
    UART_TX_CHARACTERISTIC_UUID,
};
pub use http::{HttpAdapter, PFOD_WEB_PATH};
pub use link::{BoxFuture, Link, LinkConnector, LinkReader, LinkWriter, TcpConnector};
#[cfg(feature = "serial")]
pub use serial::SerialPortConnector;
pub use stream::StreamAdapter;

pub(crate) use link::default_serial_connector;

#[cfg(test)]
pub(crate) use ble::fake as ble_fake;
