//! slidermix-agent library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! - [`application`]: the routing engine, target resolvers and drain loop.
//! - [`infrastructure`]: the serial link, host backends, storage and the
//!   command bridge.

pub mod application;
pub mod infrastructure;
