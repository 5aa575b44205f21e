//! # streamplay common library
//!
//! Shared code for the streaming player crates:
//! - Playback lifecycle state and player events
//! - Observer trait and broadcast-backed observer
//! - Configuration file resolution and TOML loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{BroadcastObserver, PlaybackObserver, PlaybackState, PlayerEvent};
