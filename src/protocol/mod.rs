//! Protocol module - wire format, framing, and tokenizing.
//!
//! This module implements the text protocol shared by every transport:
//! - full-depth frame matching for complete one-shot bodies
//! - a frame buffer for accumulating partial reads from streaming links
//! - tokenizing a frame into `|`/`}`-prefixed segments

mod extract;
mod frame;
mod frame_buffer;
mod tokenize;
mod wire_format;

pub use extract::{find_matching_close, split_response};
pub use frame::{Extracted, ResponseParts};
pub use frame_buffer::FrameBuffer;
pub use tokenize::{message_type, tokenize, PfodMessage};
pub use wire_format::{
    encode_command, MessageType, COMMAND_TERMINATOR, FIELD_SEPARATOR, FRAME_CLOSE, FRAME_OPEN,
};
