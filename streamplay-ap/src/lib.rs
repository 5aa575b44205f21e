//! # streamplay Audio Player Library (streamplay-ap)
//!
//! Gapless playback of audio that arrives incrementally as encoded fragments,
//! such as a text-to-speech stream.
//!
//! **Pipeline:** encoded bytes → [`audio::Decoder`] → [`playback::ChunkSegmenter`]
//! → [`playback::BufferStore`] → [`playback::JitterScheduler`] → [`playback::Sink`].
//! Completion events flow back from the sink onto the player's serialized queue.
//!
//! **Entry point:** [`StreamPlayer`].

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;

pub use audio::{AudioFormat, Decoder};
pub use config::{PlayerConfig, RouteChangePolicy};
pub use error::{Error, Result};
pub use playback::{StreamPlayer, Sink};
pub use streamplay_common::{PlaybackObserver, PlaybackState, PlayerEvent};
