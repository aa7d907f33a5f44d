//! Split a frame into its delimiter-prefixed segments.
//!
//! ```text
//! {,~Menu|A~one|B~two}  ->  ["{,~Menu", "|A~one", "|B~two", "}"]
//! ```
//!
//! Each segment starts with the `|` or `}` that opened it; the closing brace is
//! always a segment of its own. The first segment is the message-type token.

use serde::{Deserialize, Serialize};

use super::wire_format::{FIELD_SEPARATOR, FRAME_CLOSE};
use crate::error::Result;

/// Tokenize `frame`. Text after the closing brace becomes a trailing segment.
pub fn tokenize(frame: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for c in frame.chars() {
        if c == FIELD_SEPARATOR || c == FRAME_CLOSE {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            if c == FRAME_CLOSE {
                segments.push(FRAME_CLOSE.to_string());
            } else {
                current.push(c);
            }
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// The first segment of a frame, i.e. its message-type token.
pub fn message_type(frame: &str) -> Option<String> {
    tokenize(frame).into_iter().next()
}

/// A tokenized frame in its JSON shape, `{"cmd":[...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PfodMessage {
    pub cmd: Vec<String>,
}

impl PfodMessage {
    /// Tokenize `frame`.
    pub fn parse(frame: &str) -> Self {
        Self {
            cmd: tokenize(frame),
        }
    }

    /// Message-type token (first segment).
    pub fn message_type(&self) -> Option<&str> {
        self.cmd.first().map(String::as_str)
    }

    /// Serialize to `{"cmd":[...]}`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_frame() {
        assert_eq!(
            tokenize("{,~Menu|A~one|B~two}"),
            vec!["{,~Menu", "|A~one", "|B~two", "}"]
        );
    }

    #[test]
    fn test_empty_frame() {
        assert_eq!(tokenize("{}"), vec!["{", "}"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_adjacent_delimiters() {
        assert_eq!(tokenize("{+||}"), vec!["{+", "|", "|", "}"]);
    }

    #[test]
    fn test_trailing_text_after_close() {
        assert_eq!(tokenize("{a}b"), vec!["{a", "}", "b"]);
    }

    #[test]
    fn test_retokenizing_the_joined_segments_is_stable() {
        let frame = "{;~Up~V7|x`1|y~2}";
        let once = tokenize(frame);
        let twice = tokenize(&once.concat());
        assert_eq!(once, twice);
        assert_eq!(once.concat(), frame);
    }

    #[test]
    fn test_message_type() {
        assert_eq!(message_type("{,~M~V2|a}").as_deref(), Some("{,~M~V2"));
        assert_eq!(message_type(""), None);
    }

    #[test]
    fn test_json_shape() {
        let msg = PfodMessage::parse("{=Title|a}");
        assert_eq!(msg.message_type(), Some("{=Title"));
        assert_eq!(msg.to_json().unwrap(), r#"{"cmd":["{=Title","|a","}"]}"#);
    }
}
