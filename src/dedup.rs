//! Rotating dedup prefix.
//!
//! Every outbound command is prefixed with one character from a fixed
//! 62-symbol alphabet. The device ignores a command whose prefix matches the
//! one it last processed, so a resubmitted command must reuse its prefix and
//! the cursor only moves after a confirmed response.

/// Prefix alphabet, in rotation order.
pub const DEDUP_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Cursor into [`DEDUP_ALPHABET`]. One per connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupSequencer {
    cursor: usize,
}

impl DedupSequencer {
    /// Start at the first symbol.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at `cursor` (taken modulo the alphabet size).
    pub fn starting_at(cursor: usize) -> Self {
        Self {
            cursor: cursor % DEDUP_ALPHABET.len(),
        }
    }

    /// Prefix for the next outbound command.
    #[inline]
    pub fn current(&self) -> char {
        DEDUP_ALPHABET[self.cursor] as char
    }

    /// Move to the next symbol. Call only after a confirmed response.
    #[inline]
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % DEDUP_ALPHABET.len();
    }

    /// Cursor position, `0..62`.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// `<current><command>`.
    pub fn prefix(&self, command: &str) -> String {
        let mut out = String::with_capacity(command.len() + 1);
        out.push(self.current());
        out.push_str(command);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let seq = DedupSequencer::new();
        assert_eq!(seq.current(), '0');
        assert_eq!(seq.prefix("{.}"), "0{.}");
    }

    #[test]
    fn test_current_is_stable_until_advance() {
        let seq = DedupSequencer::starting_at(10);
        assert_eq!(seq.current(), 'A');
        assert_eq!(seq.current(), 'A');
    }

    #[test]
    fn test_wraps_after_62() {
        let mut seq = DedupSequencer::new();
        let mut seen = Vec::new();
        for _ in 0..62 {
            seen.push(seq.current());
            seq.advance();
        }
        assert_eq!(seq.current(), '0');
        assert_eq!(seen.first(), Some(&'0'));
        assert_eq!(seen.last(), Some(&'z'));
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 62);
    }

    #[test]
    fn test_alphabet_is_alphanumeric() {
        assert!(DEDUP_ALPHABET.iter().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_instances_are_independent() {
        let mut a = DedupSequencer::new();
        let b = DedupSequencer::new();
        a.advance();
        assert_eq!(a.current(), '1');
        assert_eq!(b.current(), '0');
    }
}
