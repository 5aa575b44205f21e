//! Streaming playback: segmentation, buffering, scheduling and control

pub mod buffer_store;
pub mod chunk;
pub mod engine;
pub mod player;
pub mod scheduler;
pub mod segmenter;
pub mod sink;
pub mod state;

pub use buffer_store::{BufferStore, CloseOutcome};
pub use chunk::Chunk;
pub use engine::PlaybackEngine;
pub use player::StreamPlayer;
pub use scheduler::{CompletionOutcome, JitterScheduler};
pub use segmenter::ChunkSegmenter;
pub use sink::{ChunkCompletion, CompletionNotifier, Sink, SinkKnobs};
pub use state::PlaybackStateMachine;
