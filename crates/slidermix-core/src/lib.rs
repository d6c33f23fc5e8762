//! # slidermix-core
//!
//! Shared library for SliderMix containing the serial line protocol and the
//! routing domain model.
//!
//! It has zero dependencies on OS APIs, audio subsystems, or serial ports.
//!
//! # Architecture overview (for beginners)
//!
//! SliderMix turns a small USB box with physical sliders into a volume mixer.
//! The box prints one text line per slider movement (`slider2: 512`); the agent
//! reads those lines from the serial port and sets the volume of whatever the
//! slider has been assigned to.
//!
//! This crate is the platform-independent half:
//!
//! - **`protocol`** – How bytes become events.  The [`LineFramer`] cuts the byte
//!   stream into lines and the [`EventParser`] turns protocol lines into
//!   [`SliderEvent`]s.
//!
//! - **`domain`** – Routing state.  [`VolumeTarget`], [`SliderAssignment`],
//!   [`VolumeCache`], normalization, and the [`SettingsSnapshot`] persisted
//!   between sessions.

pub mod domain;
pub mod protocol;

pub use domain::assignment::{AssignmentError, SliderAssignment, DEFAULT_SLIDER_COUNT};
pub use domain::cache::VolumeCache;
pub use domain::settings::{RoutingSnapshot, SettingsSnapshot};
pub use domain::target::{
    names_match, VolumeTarget, FOCUSED_APPLICATION_LABEL, MASTER_VOLUME_LABEL,
    SCREEN_BRIGHTNESS_LABEL,
};
pub use domain::volume::{
    brightness_to_level, clamp_level, level_to_brightness, normalize, raw_to_percent,
};
pub use protocol::{
    EventParser, FramerOutput, LineFramer, ParseOutcome, SliderEvent, DEFAULT_MAX_LINE_LEN,
    RAW_VALUE_MAX,
};
