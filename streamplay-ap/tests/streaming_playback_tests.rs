//! End-to-end streaming behavior through the public player API
//!
//! A FakeSink stands in for the device; each test fires chunk completions by
//! hand and synchronizes with the player's queue through `state()`.

mod helpers;

use helpers::*;
use streamplay_ap::audio::SymphoniaDecoder;
use streamplay_ap::{PlaybackState, PlayerConfig, PlayerEvent, StreamPlayer};
use tokio::sync::broadcast;

fn drain_states(events: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlaybackState> {
    let mut states = Vec::new();
    while let Ok(PlayerEvent::StateChanged { state, .. }) = events.try_recv() {
        states.push(state);
    }
    states
}

#[tokio::test]
async fn test_4000_samples_make_three_chunks() {
    let (player, _sink) = pcm_player();

    player.append_data(&pcm_silence(4000)).await.unwrap();
    assert_eq!(player.duration_ms().await.unwrap(), 200);

    player.last_data_appended().await.unwrap();
    assert_eq!(player.duration_ms().await.unwrap(), 300);
}

#[tokio::test]
async fn test_jitter_window_primes_then_advances_in_order() {
    let (player, sink) = pcm_player();

    player
        .append_data(&pcm_silence(CHUNK_SAMPLES * 5))
        .await
        .unwrap();
    assert_eq!(sink.scheduled(), vec![0, 1]);
    assert_eq!(player.offset_ms().await.unwrap(), 100);

    player.play();
    assert_eq!(sink.render_next(), Some(0));
    player.state().await.unwrap();
    assert_eq!(sink.scheduled(), vec![0, 1, 2]);
    assert_eq!(player.offset_ms().await.unwrap(), 200);
}

#[tokio::test]
async fn test_no_priming_until_window_exceeded() {
    let (player, sink) = pcm_player();

    player
        .append_data(&pcm_silence(CHUNK_SAMPLES * 2))
        .await
        .unwrap();
    assert!(sink.scheduled().is_empty());

    player.append_data(&pcm_silence(CHUNK_SAMPLES)).await.unwrap();
    assert_eq!(sink.scheduled(), vec![0, 1]);
}

#[tokio::test]
async fn test_fragmented_stream_plays_gapless_to_finish() {
    let (player, sink) = pcm_player();
    let mut events = player.subscribe();

    // Odd fragment sizes, including ones that split a sample
    let bytes = pcm_silence(CHUNK_SAMPLES * 6 + 321);
    let mut offset = 0;
    for size in [1, 999, 3200, 4801, 7, 5000] {
        player.append_data(&bytes[offset..offset + size]).await.unwrap();
        offset += size;
    }
    player.append_data(&bytes[offset..]).await.unwrap();
    player.last_data_appended().await.unwrap();
    player.play();

    let state = render_all(&player, &sink).await;

    assert_eq!(state, PlaybackState::Finished);
    assert_eq!(sink.scheduled(), (0..7).collect::<Vec<_>>());
    assert_eq!(sink.scheduled_samples(), CHUNK_SAMPLES * 6 + 321);
    assert_eq!(
        drain_states(&mut events),
        vec![PlaybackState::Started, PlaybackState::Finished]
    );
}

#[tokio::test]
async fn test_single_chunk_does_not_finish_early() {
    let (player, sink) = pcm_player();

    player.append_data(&pcm_silence(CHUNK_SAMPLES)).await.unwrap();
    player.last_data_appended().await.unwrap();
    player.play();

    assert_eq!(player.state().await.unwrap(), PlaybackState::Started);
    assert_eq!(sink.scheduled(), vec![0]);

    sink.render_next();
    assert_eq!(player.state().await.unwrap(), PlaybackState::Finished);
}

#[tokio::test]
async fn test_play_before_finalize_waits_for_close() {
    let (player, sink) = pcm_player();

    player.append_data(&pcm_silence(CHUNK_SAMPLES)).await.unwrap();
    player.play();

    assert_eq!(player.state().await.unwrap(), PlaybackState::Started);
    assert!(sink.scheduled().is_empty());

    player.last_data_appended().await.unwrap();
    assert_eq!(sink.scheduled(), vec![0]);
    assert_eq!(player.state().await.unwrap(), PlaybackState::Started);

    assert_eq!(render_all(&player, &sink).await, PlaybackState::Finished);
}

#[tokio::test]
async fn test_zero_chunk_stream_finishes_without_start() {
    let (player, sink) = pcm_player();
    let mut events = player.subscribe();

    player.last_data_appended().await.unwrap();

    assert_eq!(player.state().await.unwrap(), PlaybackState::Finished);
    assert_eq!(drain_states(&mut events), vec![PlaybackState::Finished]);
    assert_eq!(sink.starts(), 0);
}

#[tokio::test]
async fn test_scheduling_resumes_when_data_arrives() {
    let (player, sink) = pcm_player();

    player
        .append_data(&pcm_silence(CHUNK_SAMPLES * 3))
        .await
        .unwrap();
    player.play();
    assert_eq!(render_all(&player, &sink).await, PlaybackState::Started);
    assert_eq!(sink.scheduled(), vec![0, 1, 2]);
    assert_eq!(sink.in_flight(), 0);

    player
        .append_data(&pcm_silence(CHUNK_SAMPLES * 2))
        .await
        .unwrap();
    assert_eq!(sink.scheduled(), vec![0, 1, 2, 3, 4]);

    player.last_data_appended().await.unwrap();
    assert_eq!(render_all(&player, &sink).await, PlaybackState::Finished);
}

#[tokio::test]
async fn test_pause_and_resume_mid_stream() {
    let (player, sink) = pcm_player();
    let mut events = player.subscribe();

    player
        .append_data(&pcm_silence(CHUNK_SAMPLES * 4))
        .await
        .unwrap();
    player.play();
    player.pause();
    assert_eq!(player.state().await.unwrap(), PlaybackState::Paused);
    assert!(!sink.playing());

    player.resume();
    assert_eq!(player.state().await.unwrap(), PlaybackState::Started);
    assert!(sink.playing());
    assert_eq!(
        drain_states(&mut events),
        vec![
            PlaybackState::Started,
            PlaybackState::Paused,
            PlaybackState::Started
        ]
    );
}

#[tokio::test]
async fn test_seek_plays_from_target() {
    let (player, sink) = pcm_player();

    player
        .append_data(&pcm_silence(CHUNK_SAMPLES * 10))
        .await
        .unwrap();
    player.last_data_appended().await.unwrap();
    player.play();

    player.seek(750).await.unwrap();
    assert_eq!(player.offset_ms().await.unwrap(), 700);

    assert_eq!(render_all(&player, &sink).await, PlaybackState::Finished);
    assert_eq!(sink.scheduled(), vec![0, 1, 7, 8, 9]);
}

#[tokio::test]
async fn test_repeated_seek_while_waiting_for_data() {
    let (player, sink) = pcm_player();

    player
        .append_data(&pcm_silence(CHUNK_SAMPLES * 3))
        .await
        .unwrap();
    player.play();
    render_all(&player, &sink).await;
    assert_eq!(sink.in_flight(), 0);

    player.seek(0).await.unwrap();
    assert_eq!(player.offset_ms().await.unwrap(), 0);
    player.seek(0).await.unwrap();
    assert_eq!(player.offset_ms().await.unwrap(), 0);
    assert_eq!(sink.scheduled(), vec![0, 1, 2, 0, 1]);

    sink.render_next();
    player.state().await.unwrap();
    assert_eq!(sink.scheduled(), vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(player.offset_ms().await.unwrap(), 200);
}

#[tokio::test]
async fn test_reset_starts_a_new_stream() {
    let (player, sink) = pcm_player();

    player.append_data(&pcm_silence(CHUNK_SAMPLES)).await.unwrap();
    player.last_data_appended().await.unwrap();
    player.play();
    assert_eq!(render_all(&player, &sink).await, PlaybackState::Finished);

    player.reset();
    assert_eq!(player.state().await.unwrap(), PlaybackState::Idle);

    player
        .append_data(&pcm_silence(CHUNK_SAMPLES * 3))
        .await
        .unwrap();
    player.last_data_appended().await.unwrap();
    player.play();
    assert_eq!(render_all(&player, &sink).await, PlaybackState::Finished);
    assert_eq!(sink.scheduled(), vec![0, 0, 1, 2]);
}

#[tokio::test]
async fn test_volume_is_queued_and_readable() {
    let (player, sink) = pcm_player();

    player.set_volume(0.4);
    player.set_speed(1.5);
    player.set_pitch(300.0);
    player.state().await.unwrap();

    assert_eq!(player.volume(), 0.4);
    assert_eq!(player.speed(), 1.5);
    assert_eq!(player.pitch(), 300.0);
    assert_eq!(sink.volume(), Some(0.4));
}

#[tokio::test]
async fn test_route_change_keeps_playing_by_default() {
    let (player, sink) = pcm_player();

    player
        .append_data(&pcm_silence(CHUNK_SAMPLES * 3))
        .await
        .unwrap();
    player.play();
    player.configuration_changed();

    assert_eq!(player.state().await.unwrap(), PlaybackState::Started);
    assert_eq!(sink.reconnects(), 1);
    assert!(sink.playing());
}

#[tokio::test]
async fn test_load_wav_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    generate_sine_wav(&path, 16_000, 250, 440.0, 0.5).unwrap();

    let sink = FakeSink::default();
    let decoder = SymphoniaDecoder::new(TEST_FORMAT).with_hint("wav");
    let player = StreamPlayer::new(
        Box::new(decoder),
        Box::new(sink.clone()),
        None,
        PlayerConfig::default(),
    )
    .unwrap();

    player.load_file(&path).await.unwrap();
    assert_eq!(player.duration_ms().await.unwrap(), 300);

    player.play();
    assert_eq!(render_all(&player, &sink).await, PlaybackState::Finished);
    assert_eq!(sink.scheduled_samples(), 4000);
    assert_eq!(sink.attached(), Some(TEST_FORMAT));
}
