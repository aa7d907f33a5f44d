//! Frame buffer for accumulating partial reads from a streaming link.
//!
//! Implements a state machine for brace-delimited frames:
//! - `ScanningForOpen`: everything before the next `{` is raw text
//! - `Accumulating`: inside a frame, waiting for the closing `}`
//!
//! Streaming frames close at the *first* `}` after the opening brace. Nested
//! opens are counted but do not delay completion; wire frames do not nest in
//! practice and full matching is reserved for complete one-shot bodies (see
//! [`find_matching_close`](super::find_matching_close)).
//!
//! # Example
//!
//! ```
//! use pfod_link::protocol::{Extracted, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(b"boot ok\r\n{,~Me").iter().all(|e| !e.is_frame()));
//! let out = buffer.push(b"nu}");
//! assert_eq!(out, vec![Extracted::Frame("{,~Menu}".into())]);
//! ```

use super::frame::Extracted;
use super::wire_format::{FRAME_CLOSE, FRAME_OPEN};

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for `{`.
    ScanningForOpen,
    /// Inside a frame. `scanned` is the byte offset already checked for `}`.
    Accumulating { depth: usize, scanned: usize },
}

/// Buffer for accumulating incoming text and extracting complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Not-yet-framed text. Always starts with `{` while accumulating.
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence from the last chunk.
    utf8_tail: Vec<u8>,
    /// Current parsing state.
    state: State,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            text: String::with_capacity(1024),
            utf8_tail: Vec::new(),
            state: State::ScanningForOpen,
        }
    }

    /// Push raw bytes from the link and extract everything that is complete.
    ///
    /// A multi-byte character split across reads is held back until the rest
    /// arrives; invalid sequences are replaced with U+FFFD.
    pub fn push(&mut self, data: &[u8]) -> Vec<Extracted> {
        let text = self.decode(data);
        self.push_str(&text)
    }

    /// Push already-decoded text and extract everything that is complete.
    pub fn push_str(&mut self, data: &str) -> Vec<Extracted> {
        self.text.push_str(data);

        let mut out = Vec::new();
        while let Some(unit) = self.try_extract_one() {
            out.push(unit);
        }
        out
    }

    /// Try to extract one unit.
    ///
    /// Returns `None` when the buffer is empty or holds an incomplete frame.
    fn try_extract_one(&mut self) -> Option<Extracted> {
        match self.state {
            State::ScanningForOpen => {
                if self.text.is_empty() {
                    return None;
                }

                match self.text.find(FRAME_OPEN) {
                    None => Some(Extracted::Raw(std::mem::take(&mut self.text))),
                    Some(0) => {
                        self.state = State::Accumulating {
                            depth: 1,
                            scanned: 1,
                        };
                        self.try_extract_one()
                    }
                    Some(start) => {
                        let raw: String = self.text.drain(..start).collect();
                        Some(Extracted::Raw(raw))
                    }
                }
            }

            State::Accumulating { mut depth, scanned } => {
                let mut close = None;
                for (i, b) in self.text.bytes().enumerate().skip(scanned) {
                    if b == FRAME_OPEN as u8 {
                        depth += 1;
                    } else if b == FRAME_CLOSE as u8 {
                        close = Some(i);
                        break;
                    }
                }

                let Some(end) = close else {
                    self.state = State::Accumulating {
                        depth,
                        scanned: self.text.len(),
                    };
                    return None;
                };

                if depth > 1 {
                    tracing::debug!(depth, "Nested '{{' inside streamed frame, closing at first '}}'");
                }

                let frame: String = self.text.drain(..=end).collect();
                self.state = State::ScanningForOpen;
                Some(Extracted::Frame(frame))
            }
        }
    }

    /// Decode a chunk, carrying an incomplete trailing character over to the
    /// next call. Pass the result to [`push_str`](Self::push_str).
    pub fn decode(&mut self, data: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(data);

        let keep = incomplete_utf8_suffix(&bytes);
        if keep > 0 {
            self.utf8_tail = bytes.split_off(bytes.len() - keep);
        }

        match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    /// Number of buffered (unframed) bytes.
    pub fn len(&self) -> usize {
        self.text.len() + self.utf8_tail.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a frame has been opened but not closed.
    pub fn in_frame(&self) -> bool {
        matches!(self.state, State::Accumulating { .. })
    }

    /// Brace depth of the open frame, 0 when scanning.
    pub fn depth(&self) -> usize {
        match self.state {
            State::ScanningForOpen => 0,
            State::Accumulating { depth, .. } => depth,
        }
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.text.clear();
        self.utf8_tail.clear();
        self.state = State::ScanningForOpen;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of a trailing, not-yet-complete UTF-8 sequence (0..=3).
fn incomplete_utf8_suffix(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let b = bytes[bytes.len() - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            // continuation byte, keep looking for the lead byte
            continue;
        }
        let needed = if b & 0b1110_0000 == 0b1100_0000 {
            2
        } else if b & 0b1111_0000 == 0b1110_0000 {
            3
        } else if b & 0b1111_1000 == 0b1111_0000 {
            4
        } else {
            return 0;
        };
        return if needed > back { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(out: &[Extracted]) -> Vec<&str> {
        out.iter()
            .filter(|e| e.is_frame())
            .map(|e| e.as_str())
            .collect()
    }

    fn raw(out: &[Extracted]) -> String {
        out.iter()
            .filter(|e| !e.is_frame())
            .map(|e| e.as_str())
            .collect()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let out = buffer.push(b"{,~Menu|A~Item}");
        assert_eq!(out, vec![Extracted::Frame("{,~Menu|A~Item}".into())]);
        assert!(buffer.is_empty());
        assert!(!buffer.in_frame());
    }

    #[test]
    fn test_leading_junk_reported_as_raw() {
        let mut buffer = FrameBuffer::new();
        let out = buffer.push(b"hello\r\n{.}");
        assert_eq!(
            out,
            vec![
                Extracted::Raw("hello\r\n".into()),
                Extracted::Frame("{.}".into()),
            ]
        );
    }

    #[test]
    fn test_text_without_brace_is_discarded_as_raw() {
        let mut buffer = FrameBuffer::new();
        let out = buffer.push(b"12,34,56\n");
        assert_eq!(out, vec![Extracted::Raw("12,34,56\n".into())]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_frame() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(b"{;~up").is_empty());
        assert!(buffer.in_frame());
        assert!(buffer.push(b"date|a").is_empty());
        let out = buffer.push(b"}");
        assert_eq!(frames(&out), vec!["{;~update|a}"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let out = buffer.push(b"{a}x{b}{c}");
        assert_eq!(frames(&out), vec!["{a}", "{b}", "{c}"]);
        assert_eq!(raw(&out), "x");
    }

    #[test]
    fn test_residual_kept_for_next_push() {
        let mut buffer = FrameBuffer::new();
        let out = buffer.push(b"{a}{b");
        assert_eq!(frames(&out), vec!["{a}"]);
        assert!(buffer.in_frame());
        assert_eq!(buffer.len(), 2);

        let out = buffer.push(b"}");
        assert_eq!(frames(&out), vec!["{b}"]);
    }

    #[test]
    fn test_first_close_wins() {
        let mut buffer = FrameBuffer::new();
        let out = buffer.push(b"{a{b}c}");
        assert_eq!(frames(&out), vec!["{a{b}"]);
        assert_eq!(raw(&out), "c}");
    }

    #[test]
    fn test_depth_tracking() {
        let mut buffer = FrameBuffer::new();
        buffer.push(b"{a{b");
        assert_eq!(buffer.depth(), 2);
        buffer.push(b"}");
        assert_eq!(buffer.depth(), 0);
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let input = b"junk{,~Menu~V1|A~one|B~two}more{;~x}\r\n{+}";

        let mut whole = FrameBuffer::new();
        let whole_out = whole.push(input);

        let mut split = FrameBuffer::new();
        let mut split_out = Vec::new();
        for byte in input {
            split_out.extend(split.push(&[*byte]));
        }

        assert_eq!(frames(&whole_out), frames(&split_out));
        assert_eq!(raw(&whole_out), raw(&split_out));
        assert_eq!(frames(&whole_out), vec!["{,~Menu~V1|A~one|B~two}", "{;~x}", "{+}"]);
    }

    #[test]
    fn test_split_multibyte_character() {
        let mut buffer = FrameBuffer::new();
        let text = "{v|20°C}".as_bytes();
        let degree = text.iter().position(|&b| b == 0xC2).unwrap();

        assert!(buffer.push(&text[..=degree]).is_empty());
        let out = buffer.push(&text[degree + 1..]);
        assert_eq!(frames(&out), vec!["{v|20°C}"]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut buffer = FrameBuffer::new();
        let out = buffer.push(&[b'{', 0xFF, b'}']);
        assert_eq!(frames(&out), vec!["{\u{FFFD}}"]);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        buffer.push(b"{partial");
        assert!(buffer.in_frame());

        buffer.clear();

        assert!(!buffer.in_frame());
        assert!(buffer.is_empty());
        let out = buffer.push(b"tail}");
        assert_eq!(out, vec![Extracted::Raw("tail}".into())]);
    }

    #[test]
    fn test_incomplete_utf8_suffix() {
        assert_eq!(incomplete_utf8_suffix(b"abc"), 0);
        assert_eq!(incomplete_utf8_suffix(&[b'a', 0xE2]), 1);
        assert_eq!(incomplete_utf8_suffix(&[0xE2, 0x82]), 2);
        assert_eq!(incomplete_utf8_suffix(&[0xE2, 0x82, 0xAC]), 0);
        assert_eq!(incomplete_utf8_suffix(&[0xF0, 0x9F, 0x98]), 3);
    }
}
