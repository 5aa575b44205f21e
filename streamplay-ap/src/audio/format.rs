//! Output audio format and chunk sizing
//!
//! Samples are interleaved f32 in [-1.0, 1.0]. A chunk always covers
//! [`CHUNK_DURATION_MS`] of audio, so its size in samples is
//! `sample_rate * channels * CHUNK_DURATION_MS / 1000`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Nominal duration of one chunk
pub const CHUNK_DURATION_MS: u64 = 100;

/// Supported sample rate range (Hz)
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Supported channel counts
pub const MAX_CHANNELS: u16 = 2;

/// Sample rate and channel layout of the samples handed to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Check that chunks of this format are a whole number of frames.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(Error::UnsupportedFormat(format!(
                "sample rate {}Hz outside {}..={}Hz",
                self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(Error::UnsupportedFormat(format!(
                "{} channels (expected 1..={})",
                self.channels, MAX_CHANNELS
            )));
        }
        if (self.sample_rate as u64 * CHUNK_DURATION_MS) % 1000 != 0 {
            return Err(Error::UnsupportedFormat(format!(
                "sample rate {}Hz does not divide into {}ms chunks",
                self.sample_rate, CHUNK_DURATION_MS
            )));
        }
        Ok(())
    }

    /// Frames per chunk
    pub fn frames_per_chunk(&self) -> usize {
        (self.sample_rate as u64 * CHUNK_DURATION_MS / 1000) as usize
    }

    /// Interleaved samples per chunk
    pub fn chunk_size(&self) -> usize {
        self.frames_per_chunk() * self.channels as usize
    }

    /// Duration of `samples` interleaved samples in milliseconds
    pub fn samples_to_ms(&self, samples: usize) -> u64 {
        let frames = samples as u64 / self.channels.max(1) as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_mono_16k() {
        let format = AudioFormat::new(16_000, 1);
        assert!(format.validate().is_ok());
        assert_eq!(format.chunk_size(), 1600);
    }

    #[test]
    fn test_chunk_size_stereo_44k1() {
        let format = AudioFormat::new(44_100, 2);
        assert_eq!(format.frames_per_chunk(), 4410);
        assert_eq!(format.chunk_size(), 8820);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(AudioFormat::new(4_000, 1).validate().is_err());
        assert!(AudioFormat::new(48_000, 0).validate().is_err());
        assert!(AudioFormat::new(48_000, 6).validate().is_err());
    }

    #[test]
    fn test_rejects_fractional_chunk() {
        // 11025 Hz * 0.1 s = 1102.5 frames
        let result = AudioFormat::new(11_025, 1).validate();
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_samples_to_ms() {
        let format = AudioFormat::new(16_000, 1);
        assert_eq!(format.samples_to_ms(800), 50);
        assert_eq!(AudioFormat::new(48_000, 2).samples_to_ms(9600), 100);
    }
}
