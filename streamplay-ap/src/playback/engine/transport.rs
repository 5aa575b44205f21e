//! Transport controls for PlaybackEngine
//!
//! **Responsibilities:**
//! - play / pause / resume / stop transitions
//! - seek within the buffered stream
//! - full reset for a new stream
//! - route/device change handling
//! - volume, speed and pitch pass-through
//!
//! Fire-and-forget controls report failures through the state machine (and
//! the log) rather than to the caller.

use super::PlaybackEngine;
use crate::audio::CHUNK_DURATION_MS;
use crate::config::RouteChangePolicy;
use crate::error::{Error, Result};
use crate::playback::sink::{clamp_to, PITCH_RANGE, SPEED_RANGE, VOLUME_RANGE};
use streamplay_common::PlaybackState;
use tracing::{debug, info};

impl PlaybackEngine {
    /// Start (or continue) rendering.
    pub fn play(&mut self) {
        if self.state.is_terminal() {
            self.warn_terminal("play");
            return;
        }
        info!("Play command received");
        // Failures already moved the engine to the error state
        let _ = self.start_rendering();
    }

    pub fn pause(&mut self) {
        let current = self.state.state().clone();
        match current {
            PlaybackState::Started => {
                info!("Pause command received");
                let result = self.sink.pause();
                if self.sink_result(result).is_ok() {
                    self.state.transition(PlaybackState::Paused);
                }
            }
            PlaybackState::Paused => debug!("Already paused"),
            PlaybackState::Idle => debug!("Pause before play ignored"),
            _ => self.warn_terminal("pause"),
        }
    }

    /// Leave `pause` for `start`. Only meaningful while paused.
    pub fn resume(&mut self) {
        let current = self.state.state().clone();
        match current {
            PlaybackState::Paused => {
                info!("Resume command received");
                let _ = self.start_rendering();
            }
            state if state.is_terminal() => self.warn_terminal("resume"),
            state => debug!("Resume ignored in state {}", state),
        }
    }

    /// End the stream from any state. Idempotent.
    pub fn stop(&mut self) {
        info!("Stop command received");
        self.teardown();
        self.state.transition(PlaybackState::Stopped);
    }

    /// Move the scheduler cursor to the chunk containing `offset_ms`.
    ///
    /// Chunks already queued on the sink finish rendering first.
    ///
    /// # Errors
    /// `SeekRangeExceeded` when `offset_ms` is outside `[0, duration)`; the
    /// cursor is left untouched.
    pub fn seek(&mut self, offset_ms: i64) -> Result<()> {
        let duration_ms = self.store.duration_ms();
        if offset_ms < 0 || offset_ms as u64 >= duration_ms {
            return Err(Error::SeekRangeExceeded {
                offset_ms,
                duration_ms,
            });
        }

        let target = (offset_ms as u64 / CHUNK_DURATION_MS) as usize;
        info!("Seek to {}ms (chunk {})", offset_ms, target);
        let result = self.scheduler.seek(target, &mut self.store, self.sink.as_mut());
        self.sink_result(result)
    }

    /// Drop the current stream and return to `idle` ready for a new one.
    pub fn reset(&mut self) {
        info!("Resetting player for a new stream");
        self.teardown();
        self.segmenter.reset();
        self.decoder.reset();
        self.state.reset();
    }

    /// The output route or device configuration changed underneath the sink.
    ///
    /// The graph is reconnected first, then the configured policy decides
    /// whether playback continues.
    pub fn configuration_changed(&mut self) {
        if self.state.is_terminal() || !self.sink_started {
            debug!("Route change with no running sink ({})", self.state.state());
            return;
        }

        info!("Output configuration changed, reconnecting ({:?} policy)", self.route_policy);
        let result = self.sink.reconnect();
        if self.sink_result(result).is_err() {
            return;
        }

        match self.route_policy {
            RouteChangePolicy::Resume => {
                // A caller-paused stream stays paused
                if self.state.state() == &PlaybackState::Started {
                    let _ = self.start_rendering();
                }
            }
            RouteChangePolicy::Pause => self.pause(),
            RouteChangePolicy::Stop => self.stop(),
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = clamp_to(volume, VOLUME_RANGE);
        self.sink.set_volume(volume);
        self.knobs.store_volume(volume);
        debug!("Volume set to {:.2}", volume);
    }

    pub fn set_speed(&mut self, speed: f32) {
        let speed = clamp_to(speed, SPEED_RANGE);
        self.sink.set_speed(speed);
        self.knobs.store_speed(speed);
        debug!("Speed set to {:.2}", speed);
    }

    pub fn set_pitch(&mut self, pitch_cents: f32) {
        let pitch_cents = clamp_to(pitch_cents, PITCH_RANGE);
        self.sink.set_pitch(pitch_cents);
        self.knobs.store_pitch(pitch_cents);
        debug!("Pitch set to {:.0} cents", pitch_cents);
    }

    /// Start the sink if needed, play it, enter `start` and refill the window.
    fn start_rendering(&mut self) -> Result<()> {
        self.ensure_sink_started()?;
        let result = self.sink.play();
        self.sink_result(result)?;
        self.state.transition(PlaybackState::Started);

        let result = self.scheduler.pump(&mut self.store, self.sink.as_mut());
        self.sink_result(result)
    }
}
