//! Infrastructure layer for the agent.
//!
//! Contains OS-facing adapters: the serial link, host audio and brightness
//! backends, file-system storage, login autostart, and the command surface.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `slidermix_core`.  The drain loop reads [`serial::TaggedLine`]s, but no
//! routing or domain code depends on a concrete adapter.

pub mod audio;
pub mod autostart;
pub mod serial;
pub mod storage;
pub mod ui_bridge;
