//! Slider protocol grammar.
//!
//! A protocol line looks like `slider<N>:<ws>*<V>`, matched case-insensitively
//! after trimming surrounding whitespace:
//!
//! ```text
//! slider0: 512
//! SLIDER3:1023
//! slider12:   0
//! ```
//!
//! Anything else on the link (firmware boot banners, debug prints) is ignored.

use std::sync::OnceLock;

use regex::Regex;

/// Highest value a 10-bit potentiometer reading can take.
pub const RAW_VALUE_MAX: u32 = 1023;

const SLIDER_LINE: &str = r"(?i)^slider([0-9]+):\s*([0-9]+)$";

static SLIDER_GRAMMAR: OnceLock<Regex> = OnceLock::new();

/// The compiled grammar, built on first use and shared by every parser.
fn slider_grammar() -> &'static Regex {
    // SLIDER_LINE is a constant; the tests below compile it.
    SLIDER_GRAMMAR.get_or_init(|| Regex::new(SLIDER_LINE).expect("slider grammar must compile"))
}

/// A slider moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliderEvent {
    /// Zero-based index of the physical slider.
    pub slider_index: usize,
    /// Reading as reported by the device.  Nominally `0..=1023`; values above
    /// that are clamped during normalization, not here.
    pub raw_value: u32,
}

/// Result of matching one line against the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The line is a well-formed slider report.
    Event(SliderEvent),
    /// The line is not protocol traffic.
    NoMatch,
    /// The line matched the grammar but a number did not fit its integer type.
    Dropped,
}

impl ParseOutcome {
    /// Returns the event, if any.
    pub fn event(&self) -> Option<SliderEvent> {
        match self {
            ParseOutcome::Event(e) => Some(*e),
            _ => None,
        }
    }
}

/// Compiled matcher for slider protocol lines.
#[derive(Debug, Clone, Copy)]
pub struct EventParser {
    pattern: &'static Regex,
}

impl EventParser {
    pub fn new() -> Self {
        Self {
            pattern: slider_grammar(),
        }
    }

    /// Matches a single line.
    pub fn parse(&self, line: &str) -> ParseOutcome {
        let Some(caps) = self.pattern.captures(line.trim()) else {
            return ParseOutcome::NoMatch;
        };

        let index = caps.get(1).map(|m| m.as_str().parse::<usize>());
        let value = caps.get(2).map(|m| m.as_str().parse::<u32>());

        match (index, value) {
            (Some(Ok(slider_index)), Some(Ok(raw_value))) => ParseOutcome::Event(SliderEvent {
                slider_index,
                raw_value,
            }),
            _ => ParseOutcome::Dropped,
        }
    }
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
