//! Link generation counter.
//!
//! # Why number connections? (for beginners)
//!
//! Lines travel from the serial reader to the drain loop through a queue.
//! When the user disconnects, some lines may still be sitting in that queue.
//! Rather than trying to empty the queue at exactly the right moment, every
//! line is stamped with the *generation* of the link that produced it, and
//! the generation is bumped on every connect and disconnect.  The drain loop
//! simply drops lines whose generation is no longer current.
//!
//! The counter is an `AtomicU64`, so the reader thread, the drain task, and
//! the link manager can all read it without a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A shared, monotonically increasing link generation.
///
/// Starts at 0, meaning "no link has ever been opened".
#[derive(Debug, Default)]
pub struct LinkGeneration {
    inner: AtomicU64,
}

impl LinkGeneration {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Invalidates every line stamped so far and returns the new generation.
    ///
    /// Wraps from `u64::MAX` to 0 without panicking.
    pub fn advance(&self) -> u64 {
        // `fetch_add` returns the old value.
        self.inner.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Returns the current generation.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Acquire)
    }

    /// Returns `true` if a line stamped with `generation` is still current.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}
