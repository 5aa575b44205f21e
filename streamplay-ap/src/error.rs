//! Error types for streamplay-ap
//!
//! Synchronous-surface errors (`AudioBufferClosed`, `SeekRangeExceeded`,
//! `UnavailableSource`) are returned to the caller without touching playback
//! state. `Decode` and `SinkFailure` raised on the serialized queue also move
//! the player into its terminal error state.

use thiserror::Error;

/// Main error type for streamplay-ap
#[derive(Error, Debug)]
pub enum Error {
    /// No usable output format could be derived or the given one is invalid
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Data appended after the stream was finalized (or ended)
    #[error("Audio buffer closed")]
    AudioBufferClosed,

    /// Seek offset outside `[0, duration)`
    #[error("Seek offset {offset_ms}ms outside [0, {duration_ms}ms)")]
    SeekRangeExceeded { offset_ms: i64, duration_ms: u64 },

    /// Source could not be opened or read
    #[error("Unavailable source: {0}")]
    UnavailableSource(String),

    /// Encoded bytes could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Output device failed to start, schedule, or faulted
    #[error("Sink failure: {0}")]
    SinkFailure(String),

    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The player's serialized queue has shut down
    #[error("Player closed")]
    PlayerClosed,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the common crate
    #[error(transparent)]
    Common(#[from] streamplay_common::Error),
}

/// Convenience Result type using streamplay-ap Error
pub type Result<T> = std::result::Result<T, Error>;
