//! Audio resampling using rubato
//!
//! [`Resampler::resample`] converts a whole decoded segment in one call.
//! [`StreamResampler`] converts a stream block by block, keeping its filter
//! state so consecutive chunks join without a discontinuity.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Audio resampler using rubato for sample rate conversion.
pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`.
    ///
    /// Returns a copy when the rates already match.
    pub fn resample(
        input: &[f32],
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>> {
        if input_rate == output_rate {
            return Ok(input.to_vec());
        }
        if input.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );

        // rubato expects planar input
        let planar_input = Self::deinterleave(input, channels);
        let input_frames = planar_input[0].len();

        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        let interleaved = Self::interleave(planar_output);

        debug!(
            "Resampled {} input frames to {} output frames",
            input_frames,
            interleaved.len() / channels.max(1) as usize
        );

        Ok(interleaved)
    }

    /// [L, R, L, R, ...] → [[L, L, ...], [R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels.max(1) as usize;
        let num_frames = samples.len() / num_channels;

        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }
        planar
    }

    /// [[L, L, ...], [R, R, ...]] → [L, R, L, R, ...]
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        if planar.is_empty() {
            return Vec::new();
        }

        let num_channels = planar.len();
        let num_frames = planar[0].len();
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);

        for frame_idx in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }
        interleaved
    }
}

/// Rate converter for consecutive chunks of one stream.
///
/// Input of exactly `block_frames` frames is processed as one block. A shorter
/// input (the tail of a stream) is zero-padded by rubato and the padding's
/// output trimmed off.
pub struct StreamResampler {
    inner: FastFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: u16,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: u16, block_frames: usize) -> Result<Self> {
        let inner = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            block_frames.max(1),
            channels.max(1) as usize,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        debug!(
            "Stream resampler {}Hz -> {}Hz ({} channels, {} frame blocks)",
            input_rate, output_rate, channels, block_frames
        );
        Ok(Self {
            inner,
            input_rate,
            output_rate,
            channels,
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn ratio(&self) -> f64 {
        self.output_rate as f64 / self.input_rate as f64
    }

    /// Resample the next stretch of interleaved input.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let planar = Resampler::deinterleave(input, self.channels);
        let frames = planar.first().map_or(0, |ch| ch.len());

        let ratio = self.ratio();
        let channels = self.channels.max(1) as usize;
        let mut output = Vec::with_capacity((frames as f64 * ratio) as usize * channels + 64);
        let mut offset = 0;
        while offset < frames {
            let needed = self.inner.input_frames_next();
            let end = (offset + needed).min(frames);
            let block: Vec<&[f32]> = planar.iter().map(|ch| &ch[offset..end]).collect();

            let processed = if end - offset == needed {
                self.inner.process(&block, None)
            } else {
                self.inner.process_partial(Some(&block), None).map(|mut planar| {
                    let keep = ((end - offset) as f64 * ratio).ceil() as usize;
                    planar.iter_mut().for_each(|ch| ch.truncate(keep));
                    planar
                })
            }
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

            output.extend(Resampler::interleave(processed));
            offset = end;
        }
        Ok(output)
    }

    /// Forget filter history, e.g. when the stream restarts
    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_interleave() {
        let interleaved = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let planar = Resampler::deinterleave(&interleaved, 2);
        assert_eq!(planar, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert_eq!(Resampler::interleave(planar), interleaved);
    }

    #[test]
    fn test_resample_same_rate_is_copy() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(Resampler::resample(&input, 16_000, 16_000, 1).unwrap(), input);
    }

    #[test]
    fn test_resample_24k_to_16k_length() {
        let input_rate = 24_000;
        let frames = 2_400;
        let input: Vec<f32> = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / input_rate as f32).sin() * 0.5)
            .collect();

        let output = Resampler::resample(&input, input_rate, 16_000, 1).unwrap();

        // Allow some variance due to resampler internals
        let expected = frames * 16_000 / input_rate as usize;
        assert!(
            output.len() + 20 >= expected && output.len() <= expected + 20,
            "Expected ~{} frames, got {}",
            expected,
            output.len()
        );
    }

    fn sine(rate: u32, frames: usize, freq: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_stream_resampler_joins_chunks_without_gaps() {
        let input = sine(16_000, 16_000, 440.0);
        let mut resampler = StreamResampler::new(16_000, 48_000, 1, 1_600).unwrap();

        let outputs: Vec<Vec<f32>> = input
            .chunks(1_600)
            .map(|chunk| resampler.process(chunk).unwrap())
            .collect();

        for (n, out) in outputs.iter().enumerate().skip(1) {
            assert!(
                out.len().abs_diff(4_800) <= 2,
                "chunk {} resampled to {} frames",
                n,
                out.len()
            );
        }
        let joined: Vec<f32> = outputs.concat();
        assert!(
            joined.len().abs_diff(48_000) <= 48,
            "one second resampled to {} frames",
            joined.len()
        );

        // A 440Hz sine at amplitude 0.5 moves at most ~0.029 per 48kHz frame
        let max_step = joined
            .windows(2)
            .skip(64)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_step < 0.06, "discontinuity of {} between frames", max_step);
    }

    #[test]
    fn test_stream_resampler_short_tail() {
        let mut resampler = StreamResampler::new(16_000, 48_000, 2, 1_600).unwrap();
        let full = resampler.process(&vec![0.25; 1_600 * 2]).unwrap();
        let tail = resampler.process(&vec![0.25; 400 * 2]).unwrap();

        assert_eq!(full.len() % 2, 0);
        assert_eq!(tail.len() % 2, 0);
        assert!(!tail.is_empty());
        assert!(tail.len() <= 1_200 * 2, "tail padded to {} samples", tail.len());
        assert!(resampler.process(&[]).unwrap().is_empty());
    }
}
