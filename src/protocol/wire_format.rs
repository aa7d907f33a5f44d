//! Wire format constants and message-type classification.
//!
//! ```text
//! outbound:  <dedup><command>[\n]        e.g. 0{.}\n
//! inbound:   [junk]{<type>[|field...]}[junk]
//! type:      {,  menu start      {;  menu update
//!            {+  drawing update  {+name...  drawing start
//! ```
//!
//! Braces are ASCII, so every scan in this module is done on bytes and the
//! resulting indices are always valid `str` boundaries.

use bytes::{BufMut, Bytes, BytesMut};

/// Opens a frame.
pub const FRAME_OPEN: char = '{';

/// Closes a frame.
pub const FRAME_CLOSE: char = '}';

/// Separates fields inside a frame.
pub const FIELD_SEPARATOR: char = '|';

/// Appended to every command sent over a streaming link.
pub const COMMAND_TERMINATOR: &[u8] = b"\n";

/// Response message type, taken from the first token of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `{,...`
    MenuStart,
    /// `{;...`
    MenuUpdate,
    /// Exactly `{+`.
    DrawingUpdate,
    /// `{+` followed by more content.
    DrawingStart,
}

impl MessageType {
    /// Classify a message-type token. `None` for anything not cacheable.
    pub fn classify(msg_type: &str) -> Option<Self> {
        if msg_type.starts_with("{,") {
            Some(MessageType::MenuStart)
        } else if msg_type.starts_with("{;") {
            Some(MessageType::MenuUpdate)
        } else if msg_type == "{+" {
            Some(MessageType::DrawingUpdate)
        } else if msg_type.starts_with("{+") {
            Some(MessageType::DrawingStart)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::MenuStart => "menuStart",
            MessageType::MenuUpdate => "menuUpdate",
            MessageType::DrawingUpdate => "dwgUpdate",
            MessageType::DrawingStart => "dwgStart",
        }
    }
}

/// Encode `<dedup><command>`, optionally followed by the stream terminator.
pub fn encode_command(dedup: char, command: &str, terminated: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(command.len() + 1 + COMMAND_TERMINATOR.len());
    let mut tmp = [0u8; 4];
    buf.put_slice(dedup.encode_utf8(&mut tmp).as_bytes());
    buf.put_slice(command.as_bytes());
    if terminated {
        buf.put_slice(COMMAND_TERMINATOR);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(MessageType::classify("{,~Menu~V1"), Some(MessageType::MenuStart));
        assert_eq!(MessageType::classify("{;~x~V2"), Some(MessageType::MenuUpdate));
        assert_eq!(MessageType::classify("{+"), Some(MessageType::DrawingUpdate));
        assert_eq!(MessageType::classify("{+~dwg~V3"), Some(MessageType::DrawingStart));
        assert_eq!(MessageType::classify("{="), None);
        assert_eq!(MessageType::classify(""), None);
        assert_eq!(MessageType::classify("{"), None);
    }

    #[test]
    fn test_encode_command() {
        assert_eq!(&encode_command('A', "{.}", false)[..], b"A{.}");
        assert_eq!(&encode_command('z', "{.}", true)[..], b"z{.}\n");
    }
}
