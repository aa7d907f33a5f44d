//! Accumulates everything a device prints outside `{...}` frames.

use parking_lot::Mutex;
use serde::Serialize;

use super::ChunkObserver;

/// Size of the collected raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RawStats {
    pub total_bytes: usize,
    pub line_count: usize,
}

#[derive(Debug, Default)]
struct RawState {
    data: String,
    depth: usize,
    /// A frame just closed; the next non-newline char gets a `\n` before it.
    after_frame: bool,
    displayed: usize,
    /// Oldest text is dropped past this many bytes. `None` keeps everything.
    max_bytes: Option<usize>,
}

impl RawState {
    fn process_char(&mut self, c: char) {
        match c {
            '{' => {
                self.depth += 1;
                self.after_frame = false;
            }
            '}' => {
                self.depth = self.depth.saturating_sub(1);
                if self.depth == 0 {
                    self.after_frame = true;
                }
            }
            _ if self.depth == 0 => {
                if self.after_frame && c != '\n' && c != '\r' {
                    self.data.push('\n');
                }
                self.after_frame = false;
                self.data.push(c);
            }
            _ => {}
        }
    }

    fn enforce_limit(&mut self) {
        let Some(max) = self.max_bytes else {
            return;
        };
        if self.data.len() <= max {
            return;
        }
        let mut cut = self.data.len() - max;
        while !self.data.is_char_boundary(cut) {
            cut += 1;
        }
        self.data.drain(..cut);
        self.displayed = self.displayed.saturating_sub(cut);
    }
}

/// Out-of-frame text collector.
///
/// Frames are replaced by a line break so text printed on either side of a
/// frame does not run together.
///
/// [`new`](Self::new) keeps everything until [`take`](Self::take) or
/// [`clear`](Self::clear). Long-lived links should either drain it that way
/// or use [`with_max_bytes`](Self::with_max_bytes).
#[derive(Debug, Default)]
pub struct RawDataCollector {
    state: Mutex<RawState>,
}

impl RawDataCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most the newest `max_bytes` of text.
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(RawState {
                max_bytes: Some(max_bytes),
                ..RawState::default()
            }),
        }
    }

    /// Feed received text.
    pub fn process_chars(&self, text: &str) {
        let mut state = self.state.lock();
        for c in text.chars() {
            state.process_char(c);
        }
        state.enforce_limit();
    }

    /// Everything collected so far.
    pub fn data(&self) -> String {
        self.state.lock().data.clone()
    }

    /// Text collected since the last [`mark_displayed`](Self::mark_displayed).
    pub fn new_data(&self) -> String {
        let state = self.state.lock();
        state.data.get(state.displayed..).unwrap_or_default().to_string()
    }

    pub fn mark_displayed(&self) {
        let mut state = self.state.lock();
        state.displayed = state.data.len();
    }

    /// Return the collected text and empty the buffer. Frame tracking is kept.
    pub fn take(&self) -> String {
        let mut state = self.state.lock();
        state.displayed = 0;
        std::mem::take(&mut state.data)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.data.clear();
        state.depth = 0;
        state.displayed = 0;
    }

    pub fn stats(&self) -> RawStats {
        let state = self.state.lock();
        RawStats {
            total_bytes: state.data.len(),
            line_count: state.data.matches('\n').count(),
        }
    }
}

impl ChunkObserver for RawDataCollector {
    fn process_chars(&self, text: &str) {
        RawDataCollector::process_chars(self, text);
    }
}
