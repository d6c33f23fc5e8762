//! Device protocol: line framing and slider event parsing.

pub mod framer;
pub mod parser;

pub use framer::{FramerOutput, LineFramer, DEFAULT_MAX_LINE_LEN};
pub use parser::{EventParser, ParseOutcome, SliderEvent, RAW_VALUE_MAX};
