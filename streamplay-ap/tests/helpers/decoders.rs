//! Decoder fixtures

use streamplay_ap::{AudioFormat, Decoder, Error, Result};

/// Encode samples as s16le bytes
pub fn pcm_s16le(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// `count` samples of a quiet ramp, as s16le bytes
pub fn pcm_silence(count: usize) -> Vec<u8> {
    let samples: Vec<i16> = (0..count).map(|i| (i % 64) as i16).collect();
    pcm_s16le(&samples)
}

/// One sample per byte; fails on any fragment containing `0xFF`.
///
/// Reports no native format, so a player needs an explicit one.
pub struct FlakyDecoder;

impl Decoder for FlakyDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<f32>> {
        if bytes.contains(&0xFF) {
            return Err(Error::Decode("corrupt fragment".to_string()));
        }
        Ok(bytes.iter().map(|b| *b as f32 / 255.0).collect())
    }

    fn native_format(&self) -> Option<AudioFormat> {
        None
    }
}
