//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: Construction, stream ingestion, completion handling, teardown
//! - `transport.rs`: Caller controls (play, pause, resume, stop, seek, reset,
//!   route changes, sink knobs)
//!
//! The engine is plain synchronous state. It is owned and driven by exactly
//! one task, the player's serialized queue, so none of it needs locking.

mod core;
mod transport;

pub use self::core::PlaybackEngine;

#[cfg(test)]
pub(crate) use self::core::test_support;
