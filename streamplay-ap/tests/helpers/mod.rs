//! Test helper modules for streamplay-ap integration tests
//!
//! - FakeSink: deterministic in-memory sink; tests fire completions by hand
//! - Decoders: PCM byte builders and decoders with scripted failures
//! - Audio generator: WAV fixtures written with hound

#![allow(dead_code)]

pub mod audio_generator;
pub mod decoders;
pub mod fake_sink;

pub use audio_generator::generate_sine_wav;
pub use decoders::{pcm_s16le, pcm_silence, FlakyDecoder};
pub use fake_sink::FakeSink;

use streamplay_ap::{AudioFormat, PlaybackState, PlayerConfig, StreamPlayer};

/// 16kHz mono: 1600 samples (3200 s16le bytes) per chunk
pub const TEST_FORMAT: AudioFormat = AudioFormat {
    sample_rate: 16_000,
    channels: 1,
};

pub const CHUNK_SAMPLES: usize = 1600;

/// Player over a fresh FakeSink decoding s16le at [`TEST_FORMAT`]
pub fn pcm_player() -> (StreamPlayer, FakeSink) {
    pcm_player_with(PlayerConfig::default())
}

pub fn pcm_player_with(config: PlayerConfig) -> (StreamPlayer, FakeSink) {
    let sink = FakeSink::default();
    let decoder = streamplay_ap::audio::PcmDecoder::new(
        TEST_FORMAT,
        streamplay_ap::audio::PcmEncoding::S16Le,
    );
    let player = StreamPlayer::new(Box::new(decoder), Box::new(sink.clone()), None, config)
        .expect("player construction");
    (player, sink)
}

/// Fire every in-flight completion until the sink is idle, then return the
/// state once the queue has processed them.
pub async fn render_all(player: &StreamPlayer, sink: &FakeSink) -> PlaybackState {
    while sink.render_next().is_some() {
        // Let the queue schedule follow-up chunks before looking again
        player.state().await.expect("player alive");
    }
    player.state().await.expect("player alive")
}
