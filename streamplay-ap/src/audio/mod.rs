//! Audio decoding, format handling and device output
//!
//! Reference implementations of the player's collaborators:
//! [`PcmDecoder`] / [`SymphoniaDecoder`] for the decode side and
//! [`CpalSink`] for the output side.

pub mod decoder;
pub mod format;
pub mod output;
pub mod resampler;

pub use decoder::{remap_channels, Decoder, PcmDecoder, PcmEncoding, SymphoniaDecoder};
pub use format::{AudioFormat, CHUNK_DURATION_MS};
pub use output::CpalSink;
pub use resampler::{Resampler, StreamResampler};
