//! Player facade
//!
//! [`StreamPlayer`] is a cheap handle onto a tokio task that owns the
//! [`PlaybackEngine`]. Every mutating operation, and every sink completion,
//! is a [`Command`] on one unbounded channel, so they execute strictly in
//! enqueue order and never concurrently.
//!
//! `append_data`, `last_data_appended`, `seek` and the queries await a reply
//! from the task; transport controls and knob writes are fire-and-forget.

use crate::audio::{AudioFormat, Decoder};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::playback::engine::PlaybackEngine;
use crate::playback::sink::{CompletionNotifier, Sink, SinkKnobs};
use std::path::Path;
use std::sync::Arc;
use streamplay_common::{BroadcastObserver, PlaybackObserver, PlaybackState, PlayerEvent};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Work item for the serialized queue
enum Command {
    AppendData {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    LastDataAppended {
        reply: oneshot::Sender<Result<()>>,
    },
    Play,
    Pause,
    Resume,
    Stop,
    Seek {
        offset_ms: i64,
        reply: oneshot::Sender<Result<()>>,
    },
    Reset,
    ConfigurationChanged,
    SetVolume(f32),
    SetSpeed(f32),
    SetPitch(f32),
    ChunkCompleted {
        generation: u64,
        index: usize,
    },
    State {
        reply: oneshot::Sender<PlaybackState>,
    },
    Duration {
        reply: oneshot::Sender<u64>,
    },
    Offset {
        reply: oneshot::Sender<u64>,
    },
}

/// Streaming gapless audio player.
///
/// Must be created inside a tokio runtime. Dropping every handle shuts the
/// queue task down, which stops the sink.
pub struct StreamPlayer {
    commands: mpsc::UnboundedSender<Command>,
    knobs: Arc<SinkKnobs>,
    events: Arc<BroadcastObserver>,
    format: AudioFormat,
}

impl StreamPlayer {
    /// Create a player and spawn its serialized queue.
    ///
    /// The output format is `format` if given, otherwise the decoder's native
    /// format.
    ///
    /// # Errors
    /// - `UnsupportedFormat` if no valid format can be determined
    /// - `Config` if `config` fails validation
    /// - `SinkFailure` if the sink cannot attach to the format
    pub fn new(
        decoder: Box<dyn Decoder>,
        sink: Box<dyn Sink>,
        format: Option<AudioFormat>,
        config: PlayerConfig,
    ) -> Result<Self> {
        Self::with_observers(decoder, sink, format, config, Vec::new())
    }

    /// Like [`StreamPlayer::new`], additionally notifying `observers` of every
    /// state transition (on the queue task).
    pub fn with_observers(
        decoder: Box<dyn Decoder>,
        sink: Box<dyn Sink>,
        format: Option<AudioFormat>,
        config: PlayerConfig,
        observers: Vec<Arc<dyn PlaybackObserver>>,
    ) -> Result<Self> {
        config.validate()?;

        let format = match format {
            Some(format) => format,
            None => decoder.native_format().ok_or_else(|| {
                Error::UnsupportedFormat(
                    "no output format given and the decoder has no native format".to_string(),
                )
            })?,
        };
        format.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let knobs = Arc::new(SinkKnobs::default());
        let events = Arc::new(BroadcastObserver::new(config.event_channel_capacity));

        let mut all_observers: Vec<Arc<dyn PlaybackObserver>> =
            vec![events.clone() as Arc<dyn PlaybackObserver>];
        all_observers.extend(observers);

        let engine = PlaybackEngine::new(
            format,
            decoder,
            sink,
            &config,
            completion_notifier(&tx),
            Arc::clone(&knobs),
            all_observers,
        )?;

        tokio::spawn(run_queue(engine, rx));
        info!("Stream player created ({})", format);

        Ok(Self {
            commands: tx,
            knobs,
            events,
            format,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Decode and buffer one encoded fragment.
    ///
    /// # Errors
    /// `AudioBufferClosed` once the stream was finalized or ended; `Decode` /
    /// `SinkFailure` (the player is then in its error state).
    pub async fn append_data(&self, bytes: &[u8]) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AppendData {
            bytes: bytes.to_vec(),
            reply,
        })?;
        rx.await.map_err(|_| Error::PlayerClosed)?
    }

    /// Mark the end of the stream, flushing any partial chunk.
    pub async fn last_data_appended(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::LastDataAppended { reply })?;
        rx.await.map_err(|_| Error::PlayerClosed)?
    }

    /// Read a whole local file and play it as a single finalized stream.
    ///
    /// # Errors
    /// `UnavailableSource` if the file cannot be read.
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::UnavailableSource(format!("{}: {}", path.display(), e)))?;
        info!("Loaded {} bytes from {}", bytes.len(), path.display());

        self.append_data(&bytes).await?;
        self.last_data_appended().await
    }

    pub fn play(&self) {
        self.fire(Command::Play);
    }

    pub fn pause(&self) {
        self.fire(Command::Pause);
    }

    pub fn resume(&self) {
        self.fire(Command::Resume);
    }

    pub fn stop(&self) {
        self.fire(Command::Stop);
    }

    /// Return to `idle` ready for a new stream
    pub fn reset(&self) {
        self.fire(Command::Reset);
    }

    /// Report an output route or device change
    pub fn configuration_changed(&self) {
        self.fire(Command::ConfigurationChanged);
    }

    /// Seek to `offset_ms` within what has been buffered.
    ///
    /// # Errors
    /// `SeekRangeExceeded` if `offset_ms` is outside `[0, duration)`.
    pub async fn seek(&self, offset_ms: i64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Seek { offset_ms, reply })?;
        rx.await.map_err(|_| Error::PlayerClosed)?
    }

    /// Current state, after every previously enqueued command has run
    pub async fn state(&self) -> Result<PlaybackState> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State { reply })?;
        rx.await.map_err(|_| Error::PlayerClosed)
    }

    /// Buffered duration
    pub async fn duration_ms(&self) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Duration { reply })?;
        rx.await.map_err(|_| Error::PlayerClosed)
    }

    /// Scheduling position
    pub async fn offset_ms(&self) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Offset { reply })?;
        rx.await.map_err(|_| Error::PlayerClosed)
    }

    pub fn volume(&self) -> f32 {
        self.knobs.volume()
    }

    pub fn set_volume(&self, volume: f32) {
        self.fire(Command::SetVolume(volume));
    }

    pub fn speed(&self) -> f32 {
        self.knobs.speed()
    }

    pub fn set_speed(&self, speed: f32) {
        self.fire(Command::SetSpeed(speed));
    }

    /// Pitch shift in cents
    pub fn pitch(&self) -> f32 {
        self.knobs.pitch()
    }

    pub fn set_pitch(&self, pitch_cents: f32) {
        self.fire(Command::SetPitch(pitch_cents));
    }

    /// Receive state transitions as [`PlayerEvent`]s
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::PlayerClosed)
    }

    fn fire(&self, command: Command) {
        if self.send(command).is_err() {
            warn!("Player queue closed, command dropped");
        }
    }
}

/// Completions re-enter the queue as commands.
///
/// Holds only a weak sender so outstanding chunk handles do not keep the
/// queue alive after the player is dropped.
fn completion_notifier(tx: &mpsc::UnboundedSender<Command>) -> CompletionNotifier {
    let weak = tx.downgrade();
    Arc::new(move |generation, index| {
        if let Some(tx) = weak.upgrade() {
            let _ = tx.send(Command::ChunkCompleted { generation, index });
        }
    })
}

async fn run_queue(mut engine: PlaybackEngine, mut rx: mpsc::UnboundedReceiver<Command>) {
    debug!("Player queue started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::AppendData { bytes, reply } => {
                let _ = reply.send(engine.append_data(&bytes));
            }
            Command::LastDataAppended { reply } => {
                let _ = reply.send(engine.last_data_appended());
            }
            Command::Play => engine.play(),
            Command::Pause => engine.pause(),
            Command::Resume => engine.resume(),
            Command::Stop => engine.stop(),
            Command::Seek { offset_ms, reply } => {
                let _ = reply.send(engine.seek(offset_ms));
            }
            Command::Reset => engine.reset(),
            Command::ConfigurationChanged => engine.configuration_changed(),
            Command::SetVolume(volume) => engine.set_volume(volume),
            Command::SetSpeed(speed) => engine.set_speed(speed),
            Command::SetPitch(pitch) => engine.set_pitch(pitch),
            Command::ChunkCompleted { generation, index } => {
                engine.on_chunk_completed(generation, index)
            }
            Command::State { reply } => {
                let _ = reply.send(engine.state().clone());
            }
            Command::Duration { reply } => {
                let _ = reply.send(engine.duration_ms());
            }
            Command::Offset { reply } => {
                let _ = reply.send(engine.offset_ms());
            }
        }
    }

    debug!("Player queue closed, releasing engine");
    engine.stop();
}
