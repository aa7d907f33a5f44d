//! Full-depth frame extraction for complete response bodies.
//!
//! Unlike the streaming [`FrameBuffer`](super::FrameBuffer), which closes a
//! frame at the first `}`, this matcher counts nesting, so
//! `{a{b}c}` is one frame here.

use super::frame::ResponseParts;

/// Index of the `}` that returns nesting depth to zero, scanning from the `{`
/// at `open_index`.
///
/// Returns `None` if `open_index` is out of range, does not hold `{`, or the
/// brace is never closed.
pub fn find_matching_close(text: &str, open_index: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open_index) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open_index) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a complete body into leading junk, frame and trailing junk.
pub fn split_response(text: &str) -> ResponseParts<'_> {
    let Some(start) = text.find('{') else {
        return ResponseParts {
            before: text,
            frame: None,
            after: "",
        };
    };

    match find_matching_close(text, start) {
        Some(end) => ResponseParts {
            before: &text[..start],
            frame: Some(&text[start..=end]),
            after: &text[end + 1..],
        },
        None => ResponseParts {
            before: &text[..start],
            frame: None,
            after: &text[start..],
        },
    }
}
