//! Storage infrastructure: the two files the agent keeps on disk.
//!
//! - `config` reads the TOML runtime configuration (`config.toml`).
//! - `settings_store` loads and persists the JSON settings snapshot
//!   (`settings.json`): slider assignments, cached application volumes,
//!   the last port and the theme flag.
//!
//! Both live in the same platform config directory and both fall back to
//! defaults when the file does not exist yet (first run).

pub mod config;
pub mod settings_store;
