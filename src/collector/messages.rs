//! Bounded log of every frame sent and received, with subscribers.
//!
//! One collector is typically shared by the whole application and passed to
//! each connection at construction. Subscribers are called synchronously on
//! the thread that added the message; a panicking subscriber is logged and
//! skipped, it never reaches the transport.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::Protocol;
use crate::error::Result;

/// Default ring-buffer capacity.
pub const DEFAULT_COLLECTOR_CAPACITY: usize = 500;

/// CSV export header row.
const CSV_HEADER: &str = "timestamp,direction,protocol,message,size\n";

/// Which way a message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }
}

/// One logged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub protocol: Protocol,
    pub message: String,
    /// The command this message belongs to, when known.
    pub cmd: Option<String>,
    /// Length of `message` in bytes.
    pub size: usize,
}

/// Handle returned by [`MessageCollector::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&MessageEntry) + Send + Sync>;

struct Inner {
    messages: VecDeque<MessageEntry>,
    capacity: usize,
    paused: bool,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

/// Append-only ring buffer of [`MessageEntry`] with publish/subscribe.
pub struct MessageCollector {
    inner: Mutex<Inner>,
}

impl MessageCollector {
    /// Create a collector holding at most [`DEFAULT_COLLECTOR_CAPACITY`] messages.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_COLLECTOR_CAPACITY)
    }

    /// Create a collector holding at most `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        tracing::debug!(capacity, "Message collector created");
        Self {
            inner: Mutex::new(Inner {
                messages: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                paused: false,
                subscribers: Vec::new(),
                next_subscription: 0,
            }),
        }
    }

    /// Append a message, evict the oldest past capacity and notify subscribers.
    ///
    /// Ignored while paused.
    pub fn add_message(
        &self,
        direction: Direction,
        message: &str,
        protocol: Protocol,
        cmd: Option<&str>,
    ) {
        let entry = MessageEntry {
            timestamp: Utc::now(),
            direction,
            protocol,
            message: message.to_string(),
            cmd: cmd.map(str::to_string),
            size: message.len(),
        };

        let subscribers: Vec<Subscriber> = {
            let mut inner = self.inner.lock();
            if inner.paused {
                return;
            }
            inner.messages.push_back(entry.clone());
            while inner.messages.len() > inner.capacity {
                inner.messages.pop_front();
            }
            inner.subscribers.iter().map(|(_, s)| s.clone()).collect()
        };

        tracing::trace!(
            direction = direction.as_str(),
            %protocol,
            message = %truncate(message, 100),
            "Collected message"
        );

        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(&entry))).is_err() {
                tracing::error!("Message collector subscriber panicked");
            }
        }
    }

    /// Register a callback invoked for every new message.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&MessageEntry) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    /// Snapshot of all messages, oldest first.
    pub fn messages(&self) -> Vec<MessageEntry> {
        self.inner.lock().messages.iter().cloned().collect()
    }

    pub fn messages_by_protocol(&self, protocol: Protocol) -> Vec<MessageEntry> {
        self.inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.protocol == protocol)
            .cloned()
            .collect()
    }

    pub fn messages_by_direction(&self, direction: Direction) -> Vec<MessageEntry> {
        self.inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.direction == direction)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn clear(&self) {
        self.inner.lock().messages.clear();
        tracing::debug!("Message collector cleared");
    }

    /// Stop recording until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    pub fn resume(&self) {
        self.inner.lock().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Pretty-printed JSON array of all messages.
    pub fn export_json(&self) -> Result<String> {
        let messages = self.messages();
        Ok(serde_json::to_string_pretty(&messages)?)
    }

    /// Flat CSV: `timestamp,direction,protocol,message,size`.
    ///
    /// Quotes in messages are doubled and newlines replaced by spaces.
    pub fn export_csv(&self) -> String {
        let messages = self.messages();
        let rows: Vec<String> = messages
            .iter()
            .map(|m| {
                let message = m.message.replace('"', "\"\"").replace('\n', " ");
                format!(
                    "\"{}\",\"{}\",\"{}\",\"{}\",{}",
                    m.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                    m.direction.as_str(),
                    m.protocol,
                    message,
                    m.size
                )
            })
            .collect();
        format!("{}{}", CSV_HEADER, rows.join("\n"))
    }
}

impl Default for MessageCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MessageCollector")
            .field("len", &inner.messages.len())
            .field("capacity", &inner.capacity)
            .field("paused", &inner.paused)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_add_and_read_back() {
        let collector = MessageCollector::new();
        collector.add_message(Direction::Sent, "0{.}", Protocol::Http, Some("{.}"));
        collector.add_message(Direction::Received, "{,~Menu}", Protocol::Http, None);

        let messages = collector.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].direction, Direction::Sent);
        assert_eq!(messages[0].cmd.as_deref(), Some("{.}"));
        assert_eq!(messages[0].size, 4);
        assert_eq!(messages[1].message, "{,~Menu}");
    }

    #[test]
    fn test_eviction_keeps_newest_in_order() {
        let collector = MessageCollector::with_capacity(500);
        for i in 0..501 {
            collector.add_message(Direction::Received, &i.to_string(), Protocol::Serial, None);
        }

        let messages = collector.messages();
        assert_eq!(messages.len(), 500);
        assert_eq!(messages.first().unwrap().message, "1");
        assert_eq!(messages.last().unwrap().message, "500");
        for (idx, m) in messages.iter().enumerate() {
            assert_eq!(m.message, (idx + 1).to_string());
        }
    }

    #[test]
    fn test_subscribers_notified() {
        let collector = MessageCollector::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let id = collector.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        collector.add_message(Direction::Sent, "a", Protocol::Ble, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(collector.unsubscribe(id));
        assert!(!collector.unsubscribe(id));
        collector.add_message(Direction::Sent, "b", Protocol::Ble, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let collector = MessageCollector::new();
        let count = Arc::new(AtomicUsize::new(0));
        collector.subscribe(|_| panic!("subscriber bug"));
        let seen = count.clone();
        collector.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        collector.add_message(Direction::Received, "x", Protocol::Http, None);

        assert_eq!(collector.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pause_resume() {
        let collector = MessageCollector::new();
        collector.pause();
        collector.add_message(Direction::Sent, "dropped", Protocol::Http, None);
        assert!(collector.is_empty());

        collector.resume();
        collector.add_message(Direction::Sent, "kept", Protocol::Http, None);
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_filters() {
        let collector = MessageCollector::new();
        collector.add_message(Direction::Sent, "a", Protocol::Http, None);
        collector.add_message(Direction::Received, "b", Protocol::Serial, None);
        collector.add_message(Direction::Received, "c", Protocol::Http, None);

        assert_eq!(collector.messages_by_protocol(Protocol::Http).len(), 2);
        assert_eq!(collector.messages_by_direction(Direction::Received).len(), 2);

        collector.clear();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_export_csv() {
        let collector = MessageCollector::new();
        assert_eq!(collector.export_csv(), CSV_HEADER);

        collector.add_message(Direction::Received, "say \"hi\"\nnow", Protocol::Serial, None);
        let csv = collector.export_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("timestamp,direction,protocol,message,size"));
        let row = lines.next().unwrap();
        assert!(row.ends_with(r#","received","serial","say ""hi"" now",13"#));
        assert!(row.starts_with('"'));
        assert!(row.contains("Z\""));
    }

    #[test]
    fn test_export_json() {
        let collector = MessageCollector::new();
        collector.add_message(Direction::Sent, "0{.}", Protocol::Ble, Some("{.}"));

        let json = collector.export_json().unwrap();
        let parsed: Vec<MessageEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].protocol, Protocol::Ble);
        assert!(json.contains("\"direction\": \"sent\""));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("°°°°", 2), "°°");
    }
}
