//! Chunk segmentation of decoded samples
//!
//! Decoders hand over samples in whatever sizes the network delivered them.
//! The segmenter re-slices that into chunks of exactly `chunk_size` samples,
//! holding the remainder until more samples arrive or the stream closes.
//!
//! Concatenating every emitted chunk in order reproduces the input exactly;
//! nothing is dropped or duplicated.

use crate::audio::format::{AudioFormat, CHUNK_DURATION_MS};
use crate::error::{Error, Result};
use crate::playback::chunk::Chunk;
use tracing::trace;

pub struct ChunkSegmenter {
    chunk_size: usize,
    remainder: Vec<f32>,
    next_index: usize,
    closed: bool,
}

impl ChunkSegmenter {
    /// `chunk_size` is fixed from `format` for the segmenter's lifetime.
    pub fn new(format: AudioFormat) -> Self {
        Self::with_chunk_size(format.chunk_size())
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            chunk_size,
            remainder: Vec::with_capacity(chunk_size),
            next_index: 0,
            closed: false,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Samples held back, always fewer than one chunk
    pub fn pending_samples(&self) -> usize {
        self.remainder.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feed samples, returning every chunk that is now complete.
    pub fn append_samples(&mut self, samples: &[f32]) -> Result<Vec<Chunk>> {
        if self.closed {
            return Err(Error::AudioBufferClosed);
        }

        let mut chunks = Vec::new();
        let mut input = samples;

        // Top up the held remainder first
        if !self.remainder.is_empty() {
            let needed = self.chunk_size - self.remainder.len();
            let take = needed.min(input.len());
            self.remainder.extend_from_slice(&input[..take]);
            input = &input[take..];

            if self.remainder.len() == self.chunk_size {
                let full = std::mem::replace(&mut self.remainder, Vec::with_capacity(self.chunk_size));
                chunks.push(self.emit(full));
            }
        }

        let mut slices = input.chunks_exact(self.chunk_size);
        for slice in slices.by_ref() {
            chunks.push(self.emit(slice.to_vec()));
        }
        self.remainder.extend_from_slice(slices.remainder());

        trace!(
            "Segmented {} samples into {} chunks, {} pending",
            samples.len(),
            chunks.len(),
            self.remainder.len()
        );
        Ok(chunks)
    }

    /// Flush the remainder as a final, possibly short, chunk and refuse
    /// further input. Returns `None` when nothing was pending.
    pub fn close_stream(&mut self) -> Option<Chunk> {
        if self.closed {
            return None;
        }
        self.closed = true;

        if self.remainder.is_empty() {
            None
        } else {
            let tail = std::mem::take(&mut self.remainder);
            Some(self.emit(tail))
        }
    }

    /// Back to an empty, open segmenter starting at index 0
    pub fn reset(&mut self) {
        self.remainder.clear();
        self.next_index = 0;
        self.closed = false;
    }

    fn emit(&mut self, samples: Vec<f32>) -> Chunk {
        let chunk = Chunk::new(self.next_index, samples, CHUNK_DURATION_MS);
        self.next_index += 1;
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_4000_samples_at_16k_mono() {
        let mut segmenter = ChunkSegmenter::new(AudioFormat::new(16_000, 1));
        assert_eq!(segmenter.chunk_size(), 1600);

        let chunks = segmenter.append_samples(&ramp(0, 4000)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 1600);
        assert_eq!(chunks[1].len(), 1600);
        assert_eq!(segmenter.pending_samples(), 800);

        let tail = segmenter.close_stream().unwrap();
        assert_eq!(tail.index(), 2);
        assert_eq!(tail.len(), 800);
        assert_eq!(tail.duration_ms(), 100);
    }

    #[test]
    fn test_remainder_carried_across_calls() {
        let mut segmenter = ChunkSegmenter::with_chunk_size(4);

        assert!(segmenter.append_samples(&ramp(0, 3)).unwrap().is_empty());
        let chunks = segmenter.append_samples(&ramp(3, 6)).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].samples(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(chunks[1].samples(), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(segmenter.pending_samples(), 1);
    }

    #[test]
    fn test_concatenation_preserves_input() {
        let mut segmenter = ChunkSegmenter::with_chunk_size(7);
        let mut emitted = Vec::new();
        let mut next = 0;

        for size in [1, 13, 0, 6, 22, 3] {
            for chunk in segmenter.append_samples(&ramp(next, size)).unwrap() {
                emitted.push(chunk);
            }
            next += size;
        }
        if let Some(tail) = segmenter.close_stream() {
            emitted.push(tail);
        }

        let indices: Vec<usize> = emitted.iter().map(|c| c.index()).collect();
        assert_eq!(indices, (0..emitted.len()).collect::<Vec<_>>());

        let flattened: Vec<f32> = emitted.iter().flat_map(|c| c.samples().to_vec()).collect();
        assert_eq!(flattened, ramp(0, next));
        assert_eq!(emitted.len(), (next + 6) / 7);
    }

    #[test]
    fn test_close_without_remainder() {
        let mut segmenter = ChunkSegmenter::with_chunk_size(4);
        segmenter.append_samples(&ramp(0, 8)).unwrap();
        assert!(segmenter.close_stream().is_none());
        assert!(segmenter.is_closed());
    }

    #[test]
    fn test_append_after_close_fails() {
        let mut segmenter = ChunkSegmenter::with_chunk_size(4);
        segmenter.close_stream();
        assert!(matches!(
            segmenter.append_samples(&[1.0]),
            Err(Error::AudioBufferClosed)
        ));
    }

    #[test]
    fn test_reset_restarts_indices() {
        let mut segmenter = ChunkSegmenter::with_chunk_size(2);
        segmenter.append_samples(&ramp(0, 5)).unwrap();
        segmenter.close_stream();

        segmenter.reset();
        assert!(!segmenter.is_closed());
        assert_eq!(segmenter.pending_samples(), 0);
        let chunks = segmenter.append_samples(&ramp(0, 2)).unwrap();
        assert_eq!(chunks[0].index(), 0);
    }
}
