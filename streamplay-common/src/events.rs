//! Playback lifecycle state and player events
//!
//! `PlaybackState` is the single source of truth for where a stream is in its
//! lifecycle. Observers are told about transitions only, never about redundant
//! re-entries into the current state.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle state of one streamed utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "cause", rename_all = "lowercase")]
pub enum PlaybackState {
    /// Created, nothing played yet
    Idle,
    /// Rendering (or ready to render as soon as data is scheduled)
    #[serde(rename = "start")]
    Started,
    /// Explicitly paused by the caller
    #[serde(rename = "pause")]
    Paused,
    /// Natural end: last chunk rendered, or finalized with no data
    #[serde(rename = "finish")]
    Finished,
    /// Explicitly stopped
    #[serde(rename = "stop")]
    Stopped,
    /// Unrecoverable decode or sink failure
    Error(String),
}

impl PlaybackState {
    /// Terminal states end the stream; only a full reset leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackState::Finished | PlaybackState::Stopped | PlaybackState::Error(_)
        )
    }

    /// States in which sink completions are still meaningful
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Started => write!(f, "start"),
            PlaybackState::Paused => write!(f, "pause"),
            PlaybackState::Finished => write!(f, "finish"),
            PlaybackState::Stopped => write!(f, "stop"),
            PlaybackState::Error(cause) => write!(f, "error({})", cause),
        }
    }
}

/// Events published by a player to channel subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Lifecycle state changed
    StateChanged {
        state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            PlayerEvent::StateChanged { .. } => "StateChanged",
        }
    }
}

/// Receives lifecycle transitions
///
/// Called on the player's serialized queue; implementations must not block.
pub trait PlaybackObserver: Send + Sync {
    fn on_state_changed(&self, state: &PlaybackState);
}

/// Observer that republishes transitions as [`PlayerEvent`]s on a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<PlayerEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }
}

impl PlaybackObserver for BroadcastObserver {
    fn on_state_changed(&self, state: &PlaybackState) {
        // No receivers is fine
        let _ = self.tx.send(PlayerEvent::StateChanged {
            state: state.clone(),
            timestamp: chrono::Utc::now(),
        });
    }
}
