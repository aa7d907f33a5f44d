//! Observers of received traffic.
//!
//! - [`MessageCollector`]: bounded log of every frame sent and received
//! - [`RawDataCollector`]: text the device printed outside frames
//! - [`CsvCollector`]: CSV lines printed outside frames, grouped by width

mod csv;
mod messages;
mod raw;

pub use csv::{CsvCollector, CsvStats, CsvTotals};
pub use messages::{
    Direction, MessageCollector, MessageEntry, SubscriptionId, DEFAULT_COLLECTOR_CAPACITY,
};
pub use raw::{RawDataCollector, RawStats};

/// Receives every decoded chunk read from a streaming link, before framing.
///
/// Called from the read task; implementations must not block.
pub trait ChunkObserver: Send + Sync {
    fn process_chars(&self, text: &str);
}
