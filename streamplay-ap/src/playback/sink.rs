//! Output sink abstraction
//!
//! The sink is the real-time rendering graph: it accepts whole chunks, renders
//! them in the order they were scheduled, and reports each one back through
//! its [`ChunkCompletion`] when rendering of that chunk ends.
//!
//! Completions are produced on the render thread. `ChunkCompletion::complete`
//! only forwards the event onto the player's serialized queue; it never
//! touches player state.

use crate::audio::format::AudioFormat;
use crate::error::Result;
use crate::playback::chunk::Chunk;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Forwards `(generation, index)` completion events to the serialized queue
pub type CompletionNotifier = Arc<dyn Fn(u64, usize) + Send + Sync>;

/// One-shot completion handle attached to a scheduled chunk
pub struct ChunkCompletion {
    generation: u64,
    index: usize,
    notify: CompletionNotifier,
}

impl ChunkCompletion {
    pub fn new(generation: u64, index: usize, notify: CompletionNotifier) -> Self {
        Self {
            generation,
            index,
            notify,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report that the chunk finished rendering
    pub fn complete(self) {
        (self.notify)(self.generation, self.index);
    }
}

impl std::fmt::Debug for ChunkCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCompletion")
            .field("generation", &self.generation)
            .field("index", &self.index)
            .finish()
    }
}

/// Real-time audio output.
///
/// Owned exclusively by the player and driven only from its serialized queue.
pub trait Sink: Send {
    /// Bind the rendering graph to `format`. Called once, before `start`.
    fn attach(&mut self, format: AudioFormat) -> Result<()>;

    /// Bring the device up, initially not rendering
    fn start(&mut self) -> Result<()>;

    /// Tear the device down and drop scheduled chunks without completing them
    fn stop(&mut self);

    /// Queue a chunk behind everything already scheduled
    fn schedule_chunk(&mut self, chunk: Arc<Chunk>, completion: ChunkCompletion) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn is_playing(&self) -> bool;

    /// Rebuild the graph after a route/device change, keeping scheduled chunks
    fn reconnect(&mut self) -> Result<()>;

    fn set_volume(&mut self, volume: f32);

    fn set_speed(&mut self, speed: f32);

    fn set_pitch(&mut self, pitch_cents: f32);
}

/// Volume range
pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);
/// Playback rate range
pub const SPEED_RANGE: (f32, f32) = (0.5, 2.0);
/// Pitch shift range in cents
pub const PITCH_RANGE: (f32, f32) = (-2400.0, 2400.0);

/// Continuous sink parameters readable off the serialized queue.
///
/// Writes go through the queue (so they never race a sink teardown or
/// reconnect); the queue updates these values after applying them. Values are
/// `f32` bit patterns in atomics, so reads never lock.
#[derive(Debug)]
pub struct SinkKnobs {
    volume_bits: AtomicU32,
    speed_bits: AtomicU32,
    pitch_bits: AtomicU32,
}

impl Default for SinkKnobs {
    fn default() -> Self {
        Self {
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            speed_bits: AtomicU32::new(1.0f32.to_bits()),
            pitch_bits: AtomicU32::new(0.0f32.to_bits()),
        }
    }
}

impl SinkKnobs {
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    /// Pitch shift in cents
    pub fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn store_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn store_speed(&self, speed: f32) {
        self.speed_bits.store(speed.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn store_pitch(&self, pitch: f32) {
        self.pitch_bits.store(pitch.to_bits(), Ordering::Relaxed);
    }
}

/// Clamp `value` into `(min, max)`
pub fn clamp_to(value: f32, range: (f32, f32)) -> f32 {
    value.clamp(range.0, range.1)
}
