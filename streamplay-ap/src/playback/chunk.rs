//! Fixed-duration unit of scheduling

/// Immutable slice of decoded samples.
///
/// Created by the segmenter, owned by the buffer store once appended and
/// shared read-only with the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    index: usize,
    samples: Vec<f32>,
    duration_ms: u64,
}

impl Chunk {
    pub fn new(index: usize, samples: Vec<f32>, duration_ms: u64) -> Self {
        Self {
            index,
            samples,
            duration_ms,
        }
    }

    /// Position in playback order, contiguous from 0
    pub fn index(&self) -> usize {
        self.index
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Nominal duration; every chunk counts as a full chunk for timing,
    /// including a short final one.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
