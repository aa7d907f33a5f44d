//! Latest versioned response per (connection, command key).
//!
//! Devices tag cacheable responses with a version after the second `~` of the
//! message-type token (`{,~Menu~V7`). Storing the last one lets a host send
//! `{V7:.}` on reconnect and accept a short "unchanged" update instead of the
//! full menu.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{MessageType, PfodMessage};

/// A cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: PfodMessage,
    pub version: String,
}

/// One row of a JSON snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    identity: String,
    command_key: String,
    #[serde(flatten)]
    entry: CacheEntry,
}

/// Command key of a sent command: `{v1:c1`data}` -> `c1`, `{.}` -> `.`.
///
/// The leading `{` and an optional `version:` prefix are skipped; the key runs
/// up to the first backtick, `~`, whitespace or `}`.
pub fn extract_command_key(sent: &str) -> Option<&str> {
    let content = sent.strip_prefix('{').unwrap_or(sent);
    let content = match content.find(':') {
        Some(colon) => &content[colon + 1..],
        None => content,
    };

    let end = content
        .find(|c: char| c == '`' || c == '~' || c == '}' || c.is_whitespace())
        .unwrap_or(content.len());
    let key = &content[..end];
    (!key.is_empty()).then_some(key)
}

/// Version in a message-type token: the first word after the second `~`.
pub fn extract_version(msg_type: &str) -> Option<&str> {
    let mut parts = msg_type.splitn(3, '~');
    parts.next()?;
    parts.next()?;
    parts.next()?.split_whitespace().next()
}

/// In-memory response cache. Entries are overwritten, never evicted.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `response` if it is a versioned menu or drawing answer to `sent`.
    ///
    /// Returns true when an entry was written. Anything uncacheable is a
    /// logged no-op.
    pub fn cache(&self, response: &str, sent: &str, identity: &str) -> bool {
        let payload = PfodMessage::parse(response);
        let Some(msg_type) = payload.message_type() else {
            tracing::debug!("Not caching - empty response");
            return false;
        };

        let Some(kind) = MessageType::classify(msg_type) else {
            tracing::debug!(msg_type, "Not caching - response type not recognized");
            return false;
        };

        let Some(version) = extract_version(msg_type) else {
            tracing::debug!(kind = kind.as_str(), "Not caching - no version in response");
            return false;
        };
        let version = version.to_string();

        let Some(command_key) = extract_command_key(sent) else {
            tracing::debug!(sent, "Not caching - no command key in request");
            return false;
        };

        tracing::debug!(
            kind = kind.as_str(),
            command_key,
            identity,
            %version,
            "Cached response"
        );
        self.entries.write().insert(
            (identity.to_string(), command_key.to_string()),
            CacheEntry { payload, version },
        );
        true
    }

    pub fn get(&self, identity: &str, command_key: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .get(&(identity.to_string(), command_key.to_string()))
            .cloned()
    }

    /// Cached version for a command, for building a `{version:cmd}` request.
    pub fn version(&self, identity: &str, command_key: &str) -> Option<String> {
        self.get(identity, command_key).map(|e| e.version)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Write all entries to `path` as a JSON array.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let records: Vec<CacheRecord> = self
            .entries
            .read()
            .iter()
            .map(|((identity, command_key), entry)| CacheRecord {
                identity: identity.clone(),
                command_key: command_key.clone(),
                entry: entry.clone(),
            })
            .collect();

        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(path.as_ref(), json)?;
        tracing::debug!(entries = records.len(), path = %path.as_ref().display(), "Saved response cache");
        Ok(())
    }

    /// Load a snapshot written by [`save_json`](Self::save_json).
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let records: Vec<CacheRecord> = serde_json::from_str(&json)?;

        let entries = records
            .into_iter()
            .map(|r| ((r.identity, r.command_key), r.entry))
            .collect::<HashMap<_, _>>();
        tracing::debug!(entries = entries.len(), path = %path.as_ref().display(), "Loaded response cache");

        Ok(Self {
            entries: RwLock::new(entries),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_command_key() {
        assert_eq!(extract_command_key("{v1:c1`data}"), Some("c1"));
        assert_eq!(extract_command_key("{v1:.}"), Some("."));
        assert_eq!(extract_command_key("{c1~x}"), Some("c1"));
        assert_eq!(extract_command_key("{.}"), Some("."));
        assert_eq!(extract_command_key("{ab cd}"), Some("ab"));
        assert_eq!(extract_command_key("{}"), None);
        assert_eq!(extract_command_key("{v1:}"), None);
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("{,~X~V2"), Some("V2"));
        assert_eq!(extract_version("{,~X~  V3 extra"), Some("V3"));
        assert_eq!(extract_version("{,~X~a~b"), Some("a~b"));
        assert_eq!(extract_version("{,~X"), None);
        assert_eq!(extract_version("{;"), None);
        assert_eq!(extract_version("{,~X~   "), None);
    }

    #[test]
    fn test_menu_update_without_version_not_cached() {
        let cache = ResponseCache::new();
        assert!(!cache.cache("{;|a~1}", "{.}", "10.0.0.1"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_drawing_with_version_cached() {
        let cache = ResponseCache::new();
        assert!(cache.cache("{+~dwg~V4|x}", "{c1}", "10.0.0.1"));

        let entry = cache.get("10.0.0.1", "c1").unwrap();
        assert_eq!(entry.version, "V4");
        assert_eq!(entry.payload.cmd, vec!["{+~dwg~V4", "|x", "}"]);
        assert!(cache.get("10.0.0.2", "c1").is_none());
    }

    #[test]
    fn test_unrecognized_type_not_cached() {
        let cache = ResponseCache::new();
        assert!(!cache.cache("{=~Plot~V1}", "{p}", "Serial"));
        assert!(!cache.cache("", "{p}", "Serial"));
    }

    #[test]
    fn test_missing_command_key_not_cached() {
        let cache = ResponseCache::new();
        assert!(!cache.cache("{,~Menu~V1}", "{}", "Serial"));
    }

    #[test]
    fn test_newer_version_overwrites() {
        let cache = ResponseCache::new();
        cache.cache("{,~Menu~V1}", "{.}", "dev");
        cache.cache("{,~Menu~V2}", "{V1:.}", "dev");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.version("dev", ".").as_deref(), Some("V2"));
    }

    #[test]
    fn test_json_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = ResponseCache::new();
        cache.cache("{,~Menu~V1|A~go}", "{.}", "10.0.0.1");
        cache.cache("{+~d~V9}", "{d}", "Serial");
        cache.save_json(&path).unwrap();

        let loaded = ResponseCache::load_json(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("10.0.0.1", "."), cache.get("10.0.0.1", "."));
        assert_eq!(loaded.version("Serial", "d").as_deref(), Some("V9"));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ResponseCache::load_json(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, crate::error::PfodError::Io(_)));
    }
}
