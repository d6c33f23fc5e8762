//! Byte-stream to line segmentation for the slider device protocol.
//!
//! The controller firmware prints one ASCII line per slider change, but the
//! serial driver hands us whatever bytes happen to be buffered at read time:
//! half a line, three lines at once, or a lone `\r`.  [`LineFramer`] turns
//! that arbitrary chunking back into whole lines.
//!
//! # Framing rules
//!
//! - `\n` and `\r` are both terminators.  A terminator with an empty buffer is
//!   ignored, so `\r\n` pairs never produce an empty line.
//! - Every other byte is appended to the line buffer.
//! - The buffer is bounded.  A line of up to `max_line_len` bytes is emitted
//!   whole.  When one more byte arrives without a terminator the buffered
//!   bytes are dropped, [`FramerOutput::LineTooLong`] is reported, and the rest
//!   of that line (up to the next terminator) is discarded as well.
//!
//! Because the framer is a pure state machine over single bytes, the sequence
//! of emitted lines is independent of how the input is split into chunks.

/// Default maximum number of bytes buffered for a single line.
///
/// Protocol lines are around a dozen bytes (`slider4: 1023`); firmware banners
/// are the longest legitimate text the link carries.
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

const LF: u8 = b'\n';
const CR: u8 = b'\r';

/// One unit of output from [`LineFramer::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerOutput {
    /// A complete line, without its terminator.
    Line(String),
    /// A line exceeded the buffer bound and was discarded.
    LineTooLong {
        /// Bytes of the line received up to and including the one that
        /// crossed the bound (`max_line_len + 1`).
        dropped: usize,
    },
}

/// Incremental line splitter with a bounded buffer.
#[derive(Debug, Clone)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_len: usize,
    /// Set after an overflow; bytes are skipped until the next terminator.
    discarding: bool,
}

impl LineFramer {
    /// Creates a framer with [`DEFAULT_MAX_LINE_LEN`].
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Creates a framer with a custom line bound.
    ///
    /// A bound of `0` would drop every byte, so it falls back to the default.
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        let max_line_len = if max_line_len == 0 {
            DEFAULT_MAX_LINE_LEN
        } else {
            max_line_len
        };
        Self {
            buffer: Vec::with_capacity(max_line_len.min(DEFAULT_MAX_LINE_LEN)),
            max_line_len,
            discarding: false,
        }
    }

    /// Returns the configured line bound.
    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    /// Returns how many bytes of an unterminated line are currently buffered.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any partial line and leaves the overflow state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Feeds a chunk of bytes and returns everything it completed, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<FramerOutput> {
        let mut out = Vec::new();
        for &byte in data {
            if let Some(item) = self.push_byte(byte) {
                out.push(item);
            }
        }
        out
    }

    /// Feeds a single byte.
    pub fn push_byte(&mut self, byte: u8) -> Option<FramerOutput> {
        if byte == LF || byte == CR {
            if self.discarding {
                self.discarding = false;
                return None;
            }
            if self.buffer.is_empty() {
                return None;
            }
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            return Some(FramerOutput::Line(line));
        }

        if self.discarding {
            return None;
        }

        if self.buffer.len() == self.max_line_len {
            let dropped = self.buffer.len() + 1;
            self.buffer.clear();
            self.discarding = true;
            tracing::debug!(dropped, "line exceeded buffer bound, discarding to next terminator");
            return Some(FramerOutput::LineTooLong { dropped });
        }
        self.buffer.push(byte);
        None
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(outputs: Vec<FramerOutput>) -> Vec<String> {
        outputs
            .into_iter()
            .filter_map(|o| match o {
                FramerOutput::Line(l) => Some(l),
                FramerOutput::LineTooLong { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_feed_splits_on_newline() {
        let mut framer = LineFramer::new();
        let out = framer.feed(b"slider0: 10\nslider1: 20\n");
        assert_eq!(lines(out), vec!["slider0: 10", "slider1: 20"]);
    }

    #[test]
    fn test_crlf_pair_does_not_emit_empty_line() {
        let mut framer = LineFramer::new();
        let out = framer.feed(b"slider0: 10\r\nslider1: 20\r\n");
        assert_eq!(lines(out), vec!["slider0: 10", "slider1: 20"]);
    }

    #[test]
    fn test_bare_carriage_return_terminates_line() {
        let mut framer = LineFramer::new();
        let out = framer.feed(b"a\rb\r");
        assert_eq!(lines(out), vec!["a", "b"]);
    }

    #[test]
    fn test_terminators_alone_emit_nothing() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"\r\n\n\r\r").is_empty());
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_partial_line_is_held_until_terminator() {
        // Arrange
        let mut framer = LineFramer::new();

        // Act
        let first = framer.feed(b"slid");
        let second = framer.feed(b"er3: 7");
        let third = framer.feed(b"00\n");

        // Assert
        assert!(first.is_empty());
        assert!(second.is_empty());
        assert_eq!(lines(third), vec!["slider3: 700"]);
    }

    #[test]
    fn test_overlong_line_is_dropped_and_reported() {
        // Arrange
        let mut framer = LineFramer::with_max_line_len(8);

        // Act – 12 bytes of noise, then a valid short line
        let out = framer.feed(b"xxxxxxxxxxxx\nok\n");

        // Assert
        assert_eq!(
            out,
            vec![
                FramerOutput::LineTooLong { dropped: 9 },
                FramerOutput::Line("ok".to_string()),
            ]
        );
    }

    #[test]
    fn test_tail_of_overlong_line_is_not_emitted() {
        let mut framer = LineFramer::with_max_line_len(4);
        let out = framer.feed(b"abcdEFGH\n");
        assert_eq!(out, vec![FramerOutput::LineTooLong { dropped: 5 }]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_line_of_exactly_max_len_is_emitted() {
        // Arrange
        let mut framer = LineFramer::with_max_line_len(8);

        // Act
        let exact = framer.feed(b"abcdefgh\n");
        let over = framer.feed(b"abcdefghi\n");

        // Assert
        assert_eq!(exact, vec![FramerOutput::Line("abcdefgh".to_string())]);
        assert_eq!(over, vec![FramerOutput::LineTooLong { dropped: 9 }]);
    }

    #[test]
    fn test_default_bound_accepts_full_length_line() {
        let mut framer = LineFramer::new();
        let mut input = vec![b'x'; DEFAULT_MAX_LINE_LEN];
        input.push(b'\n');

        let out = framer.feed(&input);

        assert_eq!(out, vec![FramerOutput::Line("x".repeat(DEFAULT_MAX_LINE_LEN))]);
    }

    #[test]
    fn test_zero_bound_falls_back_to_default() {
        let framer = LineFramer::with_max_line_len(0);
        assert_eq!(framer.max_line_len(), DEFAULT_MAX_LINE_LEN);
    }

    #[test]
    fn test_reset_discards_partial_line() {
        let mut framer = LineFramer::new();
        framer.feed(b"slider1: 5");
        framer.reset();
        let out = framer.feed(b"00\n");
        assert_eq!(lines(out), vec!["00"]);
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let mut framer = LineFramer::new();
        let out = framer.feed(&[0xFF, b'a', b'\n']);
        assert_eq!(lines(out), vec!["\u{FFFD}a"]);
    }

    #[test]
    fn test_byte_at_a_time_matches_single_chunk() {
        let input = b"boot v1.2\r\nslider0: 1\nslider1:2\r\r\nslider4:   1023\n";

        let mut whole = LineFramer::new();
        let expected = whole.feed(input);

        let mut bytewise = LineFramer::new();
        let actual: Vec<FramerOutput> = input
            .iter()
            .filter_map(|&b| bytewise.push_byte(b))
            .collect();

        assert_eq!(expected, actual);
    }
}
