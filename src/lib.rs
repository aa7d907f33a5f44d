//! # pfod-link
//!
//! Transport core for pfod devices: send a short brace-framed command, get a
//! brace-framed response back, over HTTP, a serial line or a BLE UART.
//!
//! ## Architecture
//!
//! - **Protocol**: frame extraction (streaming and one-shot), tokenizing,
//!   message-type classification
//! - **Transport**: an HTTP adapter and a streaming adapter over pluggable
//!   links (serial port, TCP serial bridge, BLE UART)
//! - **Manager**: picks the adapter for a [`ConnectionConfig`] and applies
//!   the timeout and retry policy
//! - **Side observers**: [`ResponseCache`] for versioned responses,
//!   [`MessageCollector`] for a log of all traffic, raw and CSV collectors
//!   for whatever the device prints outside frames
//!
//! Every command is prefixed with a rotating dedup character so a device can
//! drop a repeated command; the character only advances after a response.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pfod_link::{ConnectionConfig, ConnectionManager, MessageCollector, ResponseCache};
//!
//! #[tokio::main]
//! async fn main() -> pfod_link::Result<()> {
//!     let collector = Arc::new(MessageCollector::new());
//!     let cache = ResponseCache::new();
//!
//!     let manager = ConnectionManager::builder(ConnectionConfig::serial("tcp://10.0.0.9:4000", 115200))
//!         .collector(collector.clone())
//!         .build()?;
//!
//!     let menu = manager.send("{.}").await?;
//!     cache.cache(&menu, "{.}", &manager.connection_identity());
//!
//!     manager.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod collector;
pub mod config;
pub mod dedup;
pub mod error;
pub mod manager;
pub mod policy;
pub mod protocol;
pub mod transport;

mod writer;

pub use cache::{CacheEntry, ResponseCache};
pub use collector::{
    ChunkObserver, CsvCollector, Direction, MessageCollector, MessageEntry, RawDataCollector,
};
pub use config::{ConnectionConfig, Protocol};
pub use dedup::DedupSequencer;
pub use error::{PfodError, Result};
pub use manager::{ConnectionManager, ConnectionManagerBuilder};
pub use protocol::{FrameBuffer, MessageType, PfodMessage};
