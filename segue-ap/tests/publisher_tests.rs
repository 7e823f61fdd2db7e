//! Integration tests for the presentation-layer streams

mod helpers;

use futures::StreamExt;
use helpers::TestPlayer;
use segue_common::events::PlaybackState;
use std::time::Duration;

async fn next_item<S: futures::Stream + Unpin>(stream: &mut S) -> S::Item {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream stalled")
        .expect("stream ended")
}

#[tokio::test]
async fn test_progress_is_zero_until_playing() {
    let player = TestPlayer::precise();
    let a = player.track("A", 3.0, 0.0);
    player.engine.set_queue(vec![a.clone()]).await.unwrap();
    player.mixer.advance(1500);

    let mut progress = Box::pin(player.engine.publisher().progress_stream());
    assert_eq!(next_item(&mut progress).await, 0);

    player.engine.start(a, 0.0).await.unwrap();
    player.mixer.advance(1200);
    assert_eq!(next_item(&mut progress).await, 1200);

    player.engine.stop().await.unwrap();
    assert_eq!(next_item(&mut progress).await, 0);
}

#[tokio::test]
async fn test_current_track_follows_handoff() {
    let player = TestPlayer::precise();
    let a = player.track("A", 1.0, 0.0);
    let b = player.track("B", 2.0, 0.0);
    player.engine.set_queue(vec![a.clone(), b.clone()]).await.unwrap();

    let publisher = player.engine.publisher();
    let mut tracks = Box::pin(publisher.current_track_stream());
    let mut durations = Box::pin(publisher.duration_stream());
    assert_eq!(next_item(&mut tracks).await, None);
    assert_eq!(next_item(&mut durations).await, 0);

    player.engine.start(a.clone(), 0.0).await.unwrap();
    assert_eq!(next_item(&mut tracks).await, Some(a));
    assert_eq!(next_item(&mut durations).await, 1000);

    assert!(player.wait_for_depth(2).await);
    player.finish_head().await;
    assert_eq!(next_item(&mut tracks).await, Some(b.clone()));
    assert_eq!(next_item(&mut durations).await, 2000);

    // A fresh subscription starts from the latest value
    let mut again = Box::pin(publisher.current_track_stream());
    assert_eq!(next_item(&mut again).await, Some(b));
}

#[tokio::test]
async fn test_state_stream_reports_transitions() {
    let player = TestPlayer::precise();
    let a = player.track("A", 2.0, 0.0);
    player.engine.set_queue(vec![a.clone()]).await.unwrap();

    let mut states = Box::pin(player.engine.publisher().playback_state_stream());
    assert_eq!(next_item(&mut states).await, PlaybackState::Stopped);

    player.engine.start(a, 0.0).await.unwrap();
    assert_eq!(next_item(&mut states).await, PlaybackState::Playing);

    player.engine.pause().await.unwrap();
    assert_eq!(next_item(&mut states).await, PlaybackState::Paused);
}

#[tokio::test]
async fn test_spectrum_tracks_head_analyser() {
    let player = TestPlayer::precise();
    let a = player.track("A", 2.0, 0.0);
    player.engine.set_queue(vec![a.clone()]).await.unwrap();

    let mut spectrum = Box::pin(player.engine.publisher().spectrum_stream());
    assert!(next_item(&mut spectrum).await.is_empty());

    player.engine.start(a, 0.0).await.unwrap();
    player.mixer.advance(200);

    let bins = next_item(&mut spectrum).await;
    let fft_size = player.engine.config().fft_size;
    assert_eq!(bins.len(), fft_size / 2);
    // Constant signal: energy sits in the DC bin
    assert!(bins[0] > 0.0);
}

#[tokio::test]
async fn test_event_stream_delivers_engine_events() {
    let player = TestPlayer::precise();
    let a = player.track("A", 2.0, 0.0);
    let mut events = Box::pin(player.engine.publisher().event_stream());

    player.engine.set_queue(vec![a.clone()]).await.unwrap();
    player.engine.set_volume(0.5).await.unwrap();

    assert_eq!(next_item(&mut events).await.event_type(), "QueueChanged");
    assert_eq!(next_item(&mut events).await.event_type(), "VolumeChanged");
}
