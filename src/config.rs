//! Connection configuration.
//!
//! A [`ConnectionConfig`] selects the transport and carries the physical
//! parameters for each one. It is deserializable from partial JSON documents:
//! every missing field falls back to its default.
//!
//! # Example
//!
//! ```
//! use pfod_link::config::{ConnectionConfig, Protocol};
//!
//! let config = ConnectionConfig::from_json(r#"{"protocol":"serial","serial":{"baud_rate":115200}}"#).unwrap();
//! assert_eq!(config.protocol, Protocol::Serial);
//! assert_eq!(config.serial.baud_rate, 115200);
//! assert_eq!(config.serial.data_bits, 8);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default response timeout in seconds.
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u32 = 3;

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Transport selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// One-shot HTTP request/response.
    #[default]
    Http,
    /// Persistent serial byte stream.
    Serial,
    /// Persistent BLE UART byte stream.
    Ble,
}

impl Protocol {
    /// Lowercase wire/log name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Serial => "serial",
            Protocol::Ble => "ble",
        }
    }

    /// True for transports that keep a link open and stream bytes.
    pub fn is_streaming(&self) -> bool {
        !matches!(self, Protocol::Http)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serial parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Serial flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Physical parameters of a serial link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port path (`/dev/ttyUSB0`, `COM3`) or `tcp://host:port` for a serial bridge.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// BLE device hints. Only used for naming the connection; selection itself
/// is done by the host's [`BleCentral`](crate::transport::BleCentral).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BleSettings {
    pub device_name: Option<String>,
    pub device_id: Option<String>,
}

/// Complete configuration for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub protocol: Protocol,
    /// HTTP target, `host[:port]` or a full `http://` base URL.
    pub target_address: Option<String>,
    /// Response timeout, 0..=30 seconds. 0 means "never" (a long finite timeout).
    pub response_timeout_secs: u32,
    pub serial: SerialSettings,
    pub ble: BleSettings,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            target_address: None,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
            serial: SerialSettings::default(),
            ble: BleSettings::default(),
        }
    }
}

impl ConnectionConfig {
    /// Create a default configuration for the given protocol.
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            ..Self::default()
        }
    }

    /// HTTP configuration targeting `address`.
    pub fn http(address: impl Into<String>) -> Self {
        Self::new(Protocol::Http).with_target_address(address)
    }

    /// Serial configuration on `port` at `baud_rate`.
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        let mut config = Self::new(Protocol::Serial);
        config.serial.port = Some(port.into());
        config.serial.baud_rate = baud_rate;
        config
    }

    /// BLE configuration.
    pub fn ble() -> Self {
        Self::new(Protocol::Ble)
    }

    /// Parse a (possibly partial) JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_target_address(mut self, address: impl Into<String>) -> Self {
        self.target_address = Some(address.into());
        self
    }

    pub fn with_response_timeout_secs(mut self, secs: u32) -> Self {
        self.response_timeout_secs = secs;
        self
    }

    pub fn with_serial(mut self, serial: SerialSettings) -> Self {
        self.serial = serial;
        self
    }

    pub fn with_ble_device_name(mut self, name: impl Into<String>) -> Self {
        self.ble.device_name = Some(name.into());
        self
    }

    /// Stable name of the physical endpoint, used to key cached responses.
    pub fn connection_identity(&self) -> String {
        match self.protocol {
            Protocol::Http => self
                .target_address
                .clone()
                .unwrap_or_else(|| "unknown_ip".to_string()),
            Protocol::Ble => self
                .ble
                .device_name
                .clone()
                .or_else(|| self.ble.device_id.clone())
                .unwrap_or_else(|| "unknown_ble".to_string()),
            Protocol::Serial => "Serial".to_string(),
        }
    }
}
