//! Groups CSV lines printed outside frames by field count.
//!
//! A line counts as CSV once it starts after a frame close or a line break;
//! text before the first of either is ignored. Lines end at `\r` or `\n` and
//! are stored trimmed, bucketed by `commas + 1`.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

use super::ChunkObserver;

/// Per-bucket statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CsvStats {
    pub field_count: usize,
    pub line_count: usize,
    pub total_bytes: usize,
}

/// Totals across all buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CsvTotals {
    pub total_lines: usize,
    pub total_bytes: usize,
    pub format_count: usize,
}

#[derive(Debug, Default)]
struct CsvState {
    by_field_count: BTreeMap<usize, Vec<String>>,
    current: String,
    collecting: bool,
    depth: usize,
    /// Oldest lines of a bucket are dropped past this count.
    max_lines_per_format: Option<usize>,
}

impl CsvState {
    fn process_char(&mut self, c: char) {
        match c {
            '{' => {
                self.depth += 1;
                self.collecting = false;
            }
            '}' => {
                self.depth = self.depth.saturating_sub(1);
                if self.depth == 0 {
                    self.collecting = true;
                }
            }
            _ if self.depth > 0 => {}
            '\r' | '\n' => {
                let line = std::mem::take(&mut self.current);
                let line = line.trim();
                if self.collecting && !line.is_empty() {
                    let fields = line.split(',').count();
                    let bucket = self.by_field_count.entry(fields).or_default();
                    bucket.push(line.to_string());
                    if let Some(max) = self.max_lines_per_format {
                        if bucket.len() > max {
                            let excess = bucket.len() - max;
                            bucket.drain(..excess);
                        }
                    }
                }
                self.collecting = true;
            }
            _ if self.collecting => self.current.push(c),
            _ => {}
        }
    }
}

/// CSV line collector.
///
/// [`new`](Self::new) keeps every line until [`clear`](Self::clear); use
/// [`with_max_lines_per_format`](Self::with_max_lines_per_format) on
/// long-lived links.
#[derive(Debug, Default)]
pub struct CsvCollector {
    state: Mutex<CsvState>,
}

impl CsvCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most the newest `max` lines for each field count.
    pub fn with_max_lines_per_format(max: usize) -> Self {
        Self {
            state: Mutex::new(CsvState {
                max_lines_per_format: Some(max),
                ..CsvState::default()
            }),
        }
    }

    pub fn process_chars(&self, text: &str) {
        let mut state = self.state.lock();
        for c in text.chars() {
            state.process_char(c);
        }
    }

    /// Field counts seen so far, ascending.
    pub fn field_counts(&self) -> Vec<usize> {
        self.state.lock().by_field_count.keys().copied().collect()
    }

    pub fn lines(&self, field_count: usize) -> Vec<String> {
        self.state
            .lock()
            .by_field_count
            .get(&field_count)
            .cloned()
            .unwrap_or_default()
    }

    pub fn line_count(&self, field_count: usize) -> usize {
        self.state
            .lock()
            .by_field_count
            .get(&field_count)
            .map_or(0, Vec::len)
    }

    /// Lines of one bucket joined by `\n`, no header.
    pub fn export_text(&self, field_count: usize) -> String {
        self.lines(field_count).join("\n")
    }

    /// Every non-empty bucket as text, keyed by field count.
    pub fn export_all(&self) -> BTreeMap<usize, String> {
        self.state
            .lock()
            .by_field_count
            .iter()
            .filter(|(_, lines)| !lines.is_empty())
            .map(|(count, lines)| (*count, lines.join("\n")))
            .collect()
    }

    pub fn stats(&self) -> BTreeMap<usize, CsvStats> {
        self.state
            .lock()
            .by_field_count
            .iter()
            .map(|(count, lines)| {
                let stats = CsvStats {
                    field_count: *count,
                    line_count: lines.len(),
                    total_bytes: lines.iter().map(String::len).sum(),
                };
                (*count, stats)
            })
            .collect()
    }

    pub fn total_stats(&self) -> CsvTotals {
        let stats = self.stats();
        CsvTotals {
            total_lines: stats.values().map(|s| s.line_count).sum(),
            total_bytes: stats.values().map(|s| s.total_bytes).sum(),
            format_count: stats.len(),
        }
    }

    /// Drop all lines. The line limit is kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = CsvState {
            max_lines_per_format: state.max_lines_per_format,
            ..CsvState::default()
        };
    }
}

impl ChunkObserver for CsvCollector {
    fn process_chars(&self, text: &str) {
        CsvCollector::process_chars(self, text);
    }
}
