//! Deterministic in-memory sink
//!
//! Nothing renders on its own: a test calls [`FakeSink::render_next`] to
//! "finish" the oldest scheduled chunk, which fires its completion exactly as
//! a device would.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use streamplay_ap::playback::{Chunk, ChunkCompletion, Sink};
use streamplay_ap::{AudioFormat, Error, Result};

#[derive(Default)]
struct FakeSinkState {
    attached: Option<AudioFormat>,
    starts: usize,
    stops: usize,
    reconnects: usize,
    playing: bool,
    scheduled: Vec<usize>,
    in_flight: VecDeque<ChunkCompletion>,
    scheduled_samples: usize,
    volume: Option<f32>,
    fail_schedule: bool,
}

/// Cloneable handle; the player owns one clone, the test keeps another
#[derive(Clone, Default)]
pub struct FakeSink(Arc<Mutex<FakeSinkState>>);

impl FakeSink {
    fn with<R>(&self, f: impl FnOnce(&mut FakeSinkState) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    /// Complete the oldest in-flight chunk, returning its index
    pub fn render_next(&self) -> Option<usize> {
        let completion = self.take_next()?;
        let index = completion.index();
        completion.complete();
        Some(index)
    }

    /// Remove the oldest in-flight chunk without completing it
    pub fn take_next(&self) -> Option<ChunkCompletion> {
        self.with(|s| s.in_flight.pop_front())
    }

    pub fn scheduled(&self) -> Vec<usize> {
        self.with(|s| s.scheduled.clone())
    }

    pub fn scheduled_samples(&self) -> usize {
        self.with(|s| s.scheduled_samples)
    }

    pub fn in_flight(&self) -> usize {
        self.with(|s| s.in_flight.len())
    }

    pub fn attached(&self) -> Option<AudioFormat> {
        self.with(|s| s.attached)
    }

    pub fn starts(&self) -> usize {
        self.with(|s| s.starts)
    }

    pub fn stops(&self) -> usize {
        self.with(|s| s.stops)
    }

    pub fn reconnects(&self) -> usize {
        self.with(|s| s.reconnects)
    }

    pub fn playing(&self) -> bool {
        self.with(|s| s.playing)
    }

    pub fn volume(&self) -> Option<f32> {
        self.with(|s| s.volume)
    }

    pub fn fail_schedule(&self, fail: bool) {
        self.with(|s| s.fail_schedule = fail);
    }
}

impl Sink for FakeSink {
    fn attach(&mut self, format: AudioFormat) -> Result<()> {
        self.with(|s| s.attached = Some(format));
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.with(|s| s.starts += 1);
        Ok(())
    }

    fn stop(&mut self) {
        self.with(|s| {
            s.stops += 1;
            s.playing = false;
            s.in_flight.clear();
        });
    }

    fn schedule_chunk(&mut self, chunk: Arc<Chunk>, completion: ChunkCompletion) -> Result<()> {
        self.with(|s| {
            if s.fail_schedule {
                return Err(Error::SinkFailure("output device lost".to_string()));
            }
            s.scheduled.push(chunk.index());
            s.scheduled_samples += chunk.len();
            s.in_flight.push_back(completion);
            Ok(())
        })
    }

    fn play(&mut self) -> Result<()> {
        self.with(|s| s.playing = true);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.with(|s| s.playing = false);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.0.lock().unwrap().playing
    }

    fn reconnect(&mut self) -> Result<()> {
        self.with(|s| s.reconnects += 1);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.with(|s| s.volume = Some(volume));
    }

    fn set_speed(&mut self, _speed: f32) {}

    fn set_pitch(&mut self, _pitch_cents: f32) {}
}
