//! Domain entities for SliderMix.
//!
//! This module contains pure routing state with no infrastructure dependencies.
//!
//! # What lives here? (for beginners)
//!
//! The domain layer answers "what does slider 2 control, and how loud should it
//! be?" without knowing anything about serial ports, audio APIs or files:
//!
//! - [`target::VolumeTarget`]: the four kinds of thing a slider can drive.
//! - [`assignment::SliderAssignment`]: which target each slider drives.
//! - [`cache::VolumeCache`]: last volume written to each named application.
//! - [`volume`]: the raw reading to level arithmetic.
//! - [`settings::SettingsSnapshot`]: the persisted form of all of the above.
//!
//! Code in outer layers (the agent's resolvers and serial link) depends on the
//! domain, but the domain never depends on them.

pub mod assignment;
pub mod cache;
pub mod settings;
pub mod target;
pub mod volume;
