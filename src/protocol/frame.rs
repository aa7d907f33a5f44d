//! Output types of the frame extractor.

/// One unit of text produced by the streaming [`FrameBuffer`](super::FrameBuffer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Text seen outside any frame (debug prints, CSV data, line noise).
    Raw(String),
    /// A complete frame, braces included.
    Frame(String),
}

impl Extracted {
    /// The text of this unit, whichever kind it is.
    pub fn as_str(&self) -> &str {
        match self {
            Extracted::Raw(s) | Extracted::Frame(s) => s,
        }
    }

    #[inline]
    pub fn is_frame(&self) -> bool {
        matches!(self, Extracted::Frame(_))
    }
}

/// A complete one-shot response body split around its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseParts<'a> {
    /// Text before the first `{` (or the whole body when there is no frame).
    pub before: &'a str,
    /// The frame, if an opening brace found its matching close.
    pub frame: Option<&'a str>,
    /// Text after the frame, or the unterminated tail when no close was found.
    pub after: &'a str,
}
