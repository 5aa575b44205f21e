//! Core playback engine - construction, ingestion and completion handling
//!
//! **Responsibilities:**
//! - PlaybackEngine struct definition and initialization
//! - Stream ingestion (decode → segment → store → schedule)
//! - Finalization and end-of-stream detection
//! - Completion re-dispatch from the sink
//! - Teardown into terminal states

use crate::audio::{AudioFormat, Decoder};
use crate::config::{PlayerConfig, RouteChangePolicy};
use crate::error::{Error, Result};
use crate::playback::buffer_store::{BufferStore, CloseOutcome};
use crate::playback::scheduler::{CompletionOutcome, JitterScheduler};
use crate::playback::segmenter::ChunkSegmenter;
use crate::playback::sink::{CompletionNotifier, Sink, SinkKnobs};
use crate::playback::state::PlaybackStateMachine;
use std::sync::Arc;
use streamplay_common::{PlaybackObserver, PlaybackState};
use tracing::{debug, error, info, warn};

/// Streaming playback engine - composes segmenter, store, scheduler, state
/// machine and sink for one stream at a time.
pub struct PlaybackEngine {
    pub(super) format: AudioFormat,
    pub(super) decoder: Box<dyn Decoder>,
    pub(super) sink: Box<dyn Sink>,
    pub(super) segmenter: ChunkSegmenter,
    pub(super) store: BufferStore,
    pub(super) scheduler: JitterScheduler,
    pub(super) state: PlaybackStateMachine,
    pub(super) knobs: Arc<SinkKnobs>,
    pub(super) route_policy: RouteChangePolicy,
    /// Whether `sink.start()` has run since the last teardown
    pub(super) sink_started: bool,
}

impl PlaybackEngine {
    /// Build an engine around an already validated `format` and attach the sink.
    ///
    /// # Errors
    /// `SinkFailure` if the sink cannot be bound to `format`.
    pub fn new(
        format: AudioFormat,
        decoder: Box<dyn Decoder>,
        mut sink: Box<dyn Sink>,
        config: &PlayerConfig,
        notifier: CompletionNotifier,
        knobs: Arc<SinkKnobs>,
        observers: Vec<Arc<dyn PlaybackObserver>>,
    ) -> Result<Self> {
        sink.attach(format).map_err(as_sink_failure)?;

        let mut state = PlaybackStateMachine::new();
        for observer in observers {
            state.add_observer(observer);
        }

        info!(
            "Playback engine ready: format={}, chunk_size={}, jitter_buffer_size={}",
            format,
            format.chunk_size(),
            config.jitter_buffer_size
        );

        Ok(Self {
            format,
            decoder,
            sink,
            segmenter: ChunkSegmenter::new(format),
            store: BufferStore::new(),
            scheduler: JitterScheduler::new(config.jitter_buffer_size, notifier),
            state,
            knobs,
            route_policy: config.route_change_policy,
            sink_started: false,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn state(&self) -> &PlaybackState {
        self.state.state()
    }

    /// Total buffered duration
    pub fn duration_ms(&self) -> u64 {
        self.store.duration_ms()
    }

    /// Scheduler cursor position
    pub fn offset_ms(&self) -> u64 {
        self.scheduler.cursor() as u64 * crate::audio::CHUNK_DURATION_MS
    }

    /// Decode a fragment and feed the resulting chunks into the pipeline.
    ///
    /// # Errors
    /// - `AudioBufferClosed` after finalization or in a terminal state
    ///   (nothing is decoded or stored)
    /// - `Decode` / `SinkFailure`, after moving to the error state
    pub fn append_data(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state.is_terminal() || self.segmenter.is_closed() {
            debug!("Rejecting {} bytes: stream closed ({})", bytes.len(), self.state.state());
            return Err(Error::AudioBufferClosed);
        }

        let samples = match self.decoder.decode(bytes) {
            Ok(samples) => samples,
            Err(e) => {
                let e = match e {
                    Error::Decode(_) => e,
                    other => Error::Decode(other.to_string()),
                };
                self.fail(&e);
                return Err(e);
            }
        };

        let chunks = self.segmenter.append_samples(&samples)?;
        if chunks.is_empty() {
            return Ok(());
        }
        debug!(
            "Appended {} bytes → {} samples → {} chunks",
            bytes.len(),
            samples.len(),
            chunks.len()
        );

        let resolved = self.store.append(chunks)?;
        let result = self
            .scheduler
            .on_growth(&mut self.store, self.sink.as_mut(), resolved);
        self.sink_result(result)
    }

    /// Flush the pending remainder and close the stream.
    ///
    /// A stream that ends with zero chunks goes straight to `finish`.
    pub fn last_data_appended(&mut self) -> Result<()> {
        if self.state.is_terminal() || self.segmenter.is_closed() {
            return Err(Error::AudioBufferClosed);
        }

        let tail = self.segmenter.close_stream();
        let (outcome, _) = self.store.close_with_last(tail)?;

        match outcome {
            CloseOutcome::Empty => {
                info!("Stream finalized with no audio");
                self.finish();
                Ok(())
            }
            CloseOutcome::Closed { chunk_count } => {
                info!(
                    "Stream finalized: {} chunks, {}ms",
                    chunk_count,
                    self.store.duration_ms()
                );
                let result = self.scheduler.on_closed(&mut self.store, self.sink.as_mut());
                if self.sink_result(result)? {
                    self.finish();
                }
                Ok(())
            }
        }
    }

    /// Handle a completion event re-dispatched from the sink.
    pub fn on_chunk_completed(&mut self, generation: u64, index: usize) {
        if !self.state.is_active() {
            debug!(
                "Discarding completion of chunk {} in state {}",
                index,
                self.state.state()
            );
            return;
        }

        let result = self
            .scheduler
            .on_completion(generation, index, &mut self.store, self.sink.as_mut());
        match self.sink_result(result) {
            Ok(CompletionOutcome::Finished) => self.finish(),
            Ok(_) => {}
            Err(e) => debug!("Completion of chunk {} ended in failure: {}", index, e),
        }
    }

    /// Natural end of stream
    pub(super) fn finish(&mut self) {
        self.teardown();
        self.state.transition(PlaybackState::Finished);
    }

    /// Unrecoverable decode or sink failure
    pub(super) fn fail(&mut self, cause: &Error) {
        error!("Playback failed: {}", cause);
        self.teardown();
        self.state.transition(PlaybackState::Error(cause.to_string()));
    }

    /// Stop the sink, drop all audio and invalidate outstanding completions.
    ///
    /// The segmenter is left as is: a terminal stream stays closed to new data
    /// until a full reset.
    pub(super) fn teardown(&mut self) {
        if self.sink_started {
            self.sink.stop();
            self.sink_started = false;
        }
        self.store.reset();
        self.scheduler.reset();
    }

    /// Route a sink-side result through the failure path.
    pub(super) fn sink_result<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let e = as_sink_failure(e);
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Bring the sink up on first use after construction or teardown.
    pub(super) fn ensure_sink_started(&mut self) -> Result<()> {
        if self.sink_started {
            return Ok(());
        }
        let result = self.sink.start();
        self.sink_result(result)?;
        self.sink_started = true;
        debug!("Sink started");
        Ok(())
    }

    pub(super) fn warn_terminal(&self, operation: &str) {
        warn!("Ignoring {} in terminal state {}", operation, self.state.state());
    }
}

fn as_sink_failure(e: Error) -> Error {
    match e {
        Error::SinkFailure(_) => e,
        other => Error::SinkFailure(other.to_string()),
    }
}
