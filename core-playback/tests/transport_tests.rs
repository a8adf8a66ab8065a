//! Integration tests for transport control and track advancement

mod common;

use common::{count_calls, drain_errors, eventually, track, Harness, MockMusic, SMALL};
use core_playback::{
    EnqueueOptions, MediaKey, NextPlayerState, PlaybackConfig, PlaybackError, PlayerState,
    RepeatMode,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

async fn start_queue(harness: &Harness, ids: &[&str]) {
    let tracks = harness.tracks(ids, SMALL);
    harness
        .coordinator
        .enqueue(tracks, EnqueueOptions::default().autoplay())
        .await
        .unwrap();
    harness.wait_for_state(PlayerState::Started).await;
}

fn url(id: &str) -> String {
    format!("http://music.test/stream/{id}")
}

#[tokio::test(start_paused = true)]
async fn test_play_waits_for_download_then_starts() {
    let harness = Harness::new().await;
    start_queue(&harness, &["a", "b", "c"]).await;

    assert_eq!(harness.coordinator.current_index().await, Some(0));
    let player = harness.player_for("a");
    assert_eq!(count_calls(&player, "start"), 1);
    assert!(player.source_name().contains(".complete."));
}

#[tokio::test(start_paused = true)]
async fn test_play_out_of_range_clears_current() {
    let harness = Harness::new().await;
    start_queue(&harness, &["a", "b"]).await;

    harness.coordinator.play(7).await.unwrap();

    assert_eq!(harness.coordinator.player_state().await, PlayerState::Idle);
    assert_eq!(harness.coordinator.current_index().await, None);
    assert_eq!(harness.coordinator.current_track().await, None);
    assert_eq!(harness.coordinator.queue_len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_partial_file_starts_once_buffered() {
    let harness = Harness::new().await;
    let tracks = harness.tracks(&["big"], 1_000_000);
    harness.http.hold(&url("big"), 50_000);

    harness
        .coordinator
        .enqueue(tracks, EnqueueOptions::default().autoplay())
        .await
        .unwrap();
    harness.settle().await;
    assert_eq!(harness.coordinator.player_state().await, PlayerState::Downloading);
    assert_eq!(harness.players.created(), 0);

    harness.http.release(&url("big"));
    harness.wait_for_state(PlayerState::Started).await;
    assert_eq!(count_calls(&harness.player_for("big"), "start"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_seek_while_downloading_moves_start_position() {
    let harness = Harness::new().await;
    let tracks = harness.tracks(&["big"], 1_000_000);
    harness.http.hold(&url("big"), 10_000);

    harness
        .coordinator
        .enqueue(tracks, EnqueueOptions::default().autoplay())
        .await
        .unwrap();
    harness.settle().await;
    harness.coordinator.seek_to(3_000).await.unwrap();

    harness.http.release(&url("big"));
    harness.wait_for_state(PlayerState::Started).await;
    assert_eq!(count_calls(&harness.player_for("big"), "seek:3000"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeat_off_stops_at_end_of_queue() {
    let harness = Harness::builder()
        .config(PlaybackConfig::default().with_gapless(false))
        .build()
        .await;
    start_queue(&harness, &["a", "b"]).await;

    harness.player_for("a").complete();
    harness.wait_for_index(Some(1)).await;
    harness.wait_for_state(PlayerState::Started).await;

    harness.player_for("b").complete();
    harness.wait_for_state(PlayerState::Idle).await;
    assert_eq!(harness.coordinator.current_index().await, Some(1));
    assert_eq!(harness.coordinator.queue_len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_playlist_on_end() {
    let harness = Harness::builder()
        .config(
            PlaybackConfig::default()
                .with_gapless(false)
                .with_clear_playlist_on_end(true),
        )
        .build()
        .await;
    start_queue(&harness, &["a"]).await;

    harness.player_for("a").complete();
    harness.wait_for_state(PlayerState::Idle).await;
    assert_eq!(harness.coordinator.queue_len().await, 0);
    assert_eq!(harness.coordinator.current_index().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_repeat_single_replays_current() {
    let harness = Harness::builder()
        .config(PlaybackConfig::default().with_gapless(false))
        .build()
        .await;
    start_queue(&harness, &["a", "b"]).await;
    harness.coordinator.set_repeat_mode(RepeatMode::Single).await.unwrap();

    let player = harness.player_for("a");
    player.complete();
    eventually("second start", || count_calls(&player, "start") == 2).await;
    harness.wait_for_state(PlayerState::Started).await;
    assert_eq!(harness.coordinator.current_index().await, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_repeat_all_wraps_to_start() {
    let harness = Harness::builder()
        .config(PlaybackConfig::default().with_gapless(false))
        .build()
        .await;
    start_queue(&harness, &["a", "b"]).await;
    harness.coordinator.set_repeat_mode(RepeatMode::All).await.unwrap();

    harness.coordinator.next().await.unwrap();
    harness.wait_for_index(Some(1)).await;
    assert_eq!(harness.coordinator.next_index().await, Some(0));

    harness.player_for("b").complete();
    harness.wait_for_index(Some(0)).await;
    harness.wait_for_state(PlayerState::Started).await;
}

#[tokio::test(start_paused = true)]
async fn test_next_at_end_is_noop() {
    let harness = Harness::new().await;
    start_queue(&harness, &["a", "b"]).await;

    harness.coordinator.play(1).await.unwrap();
    harness.wait_for_state(PlayerState::Started).await;
    harness.coordinator.next().await.unwrap();

    assert_eq!(harness.coordinator.current_index().await, Some(1));
    assert_eq!(harness.coordinator.player_state().await, PlayerState::Started);
}

#[tokio::test(start_paused = true)]
async fn test_previous_restarts_past_threshold() {
    let harness = Harness::new().await;
    start_queue(&harness, &["a", "b"]).await;
    harness.coordinator.play(1).await.unwrap();
    harness.wait_for_state(PlayerState::Started).await;

    harness.coordinator.seek_to(10_000).await.unwrap();
    assert_eq!(harness.coordinator.position_ms().await, 10_000);

    harness.coordinator.previous().await.unwrap();
    assert_eq!(harness.coordinator.current_index().await, Some(1));
    assert_eq!(harness.coordinator.position_ms().await, 0);

    harness.coordinator.previous().await.unwrap();
    assert_eq!(harness.coordinator.current_index().await, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_pause_start_stop() {
    let harness = Harness::new().await;
    start_queue(&harness, &["a"]).await;
    let coordinator = &harness.coordinator;

    coordinator.toggle_play_pause().await.unwrap();
    assert_eq!(coordinator.player_state().await, PlayerState::Paused);
    coordinator.toggle_play_pause().await.unwrap();
    assert_eq!(coordinator.player_state().await, PlayerState::Started);

    coordinator.stop().await.unwrap();
    assert_eq!(coordinator.player_state().await, PlayerState::Stopped);
    coordinator.pause().await.unwrap();
    assert_eq!(coordinator.player_state().await, PlayerState::Stopped);

    coordinator.start().await.unwrap();
    assert_eq!(coordinator.player_state().await, PlayerState::Started);

    let player = harness.player_for("a");
    assert_eq!(count_calls(&player, "pause"), 1);
    assert_eq!(count_calls(&player, "stop"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_from_idle_plays_current() {
    let harness = Harness::new().await;
    let tracks = harness.tracks(&["a", "b"], SMALL);
    harness
        .coordinator
        .enqueue(tracks, EnqueueOptions::default())
        .await
        .unwrap();
    assert_eq!(harness.coordinator.player_state().await, PlayerState::Idle);
    assert_eq!(harness.coordinator.current_index().await, Some(0));

    harness.coordinator.toggle_play_pause().await.unwrap();
    harness.wait_for_state(PlayerState::Started).await;
}

#[tokio::test(start_paused = true)]
async fn test_media_keys() {
    let harness = Harness::new().await;
    start_queue(&harness, &["a", "b"]).await;
    let coordinator = &harness.coordinator;

    coordinator.handle_media_key(MediaKey::HeadsetHook).await.unwrap();
    assert_eq!(coordinator.player_state().await, PlayerState::Paused);
    coordinator.handle_media_key(MediaKey::Play).await.unwrap();
    assert_eq!(coordinator.player_state().await, PlayerState::Started);

    coordinator.handle_media_key(MediaKey::Next).await.unwrap();
    harness.wait_for_index(Some(1)).await;
    harness.wait_for_state(PlayerState::Started).await;

    coordinator.handle_media_key(MediaKey::Next).await.unwrap();
    assert_eq!(coordinator.current_index().await, Some(1));

    coordinator.handle_media_key(MediaKey::Stop).await.unwrap();
    assert_eq!(coordinator.player_state().await, PlayerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_volume_is_validated_and_applied() {
    let harness = Harness::new().await;
    start_queue(&harness, &["a"]).await;

    let err = harness.coordinator.set_volume(1.5).await.unwrap_err();
    assert!(matches!(err, PlaybackError::InvalidVolume(_)));

    harness.coordinator.set_volume(0.25).await.unwrap();
    assert_eq!(harness.coordinator.volume().await, 0.25);
    assert_eq!(count_calls(&harness.player_for("a"), "volume:0.25"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_player_error_retries_once() {
    let harness = Harness::new().await;
    let mut errors = harness.playback_events();
    start_queue(&harness, &["a"]).await;
    let player = harness.player_for("a");

    player.fail("decoder died");
    eventually("replay after error", || count_calls(&player, "start") == 2).await;
    harness.wait_for_state(PlayerState::Started).await;

    player.fail("decoder died again");
    harness.wait_for_state(PlayerState::Idle).await;

    let reported: Vec<bool> = drain_errors(&mut errors).into_iter().map(|(_, r)| r).collect();
    assert_eq!(reported, vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_early_completion_of_partial_file_waits_and_resumes() {
    let harness = Harness::builder()
        .config(PlaybackConfig::default().with_gapless(false))
        .build()
        .await;
    let a = track("a", 1_000_000).with_duration_ms(200_000);
    harness.http.serve(&a.stream_uri, common::body(1_000_000));
    harness.http.hold(&a.stream_uri, 150_000);
    harness
        .coordinator
        .enqueue(vec![a], EnqueueOptions::default().autoplay())
        .await
        .unwrap();
    harness.wait_for_state(PlayerState::Started).await;
    let player = harness.player_for("a");
    assert!(player.source_name().contains(".partial."));

    // The player ran out of data 5s in, long before the transfer finished.
    player.set_position(5_000);
    harness.settle().await;
    player.complete();
    harness.wait_for_state(PlayerState::Downloading).await;
    assert_eq!(harness.coordinator.current_index().await, Some(0));

    harness.http.release(&url("a"));
    harness.wait_for_state(PlayerState::Started).await;
    let player = harness.player_for("a");
    assert_eq!(count_calls(&player, "seek:5000"), 1);
    assert_eq!(harness.coordinator.current_index().await, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_completion_of_finished_file_advances() {
    let harness = Harness::builder()
        .config(PlaybackConfig::default().with_gapless(false))
        .build()
        .await;
    // Tagged duration overstates the audio by 1.5s.
    let a = track("a", SMALL).with_duration_ms(180_000);
    harness.http.serve(&a.stream_uri, common::body(SMALL));
    let b = harness.tracks(&["b"], SMALL).remove(0);
    harness
        .coordinator
        .enqueue(vec![a.clone(), b], EnqueueOptions::default())
        .await
        .unwrap();
    let entry = harness.coordinator.entry_for(&a).await.unwrap();
    eventually("a cached", || entry.is_complete_file_available()).await;

    harness.coordinator.play(0).await.unwrap();
    harness.wait_for_state(PlayerState::Started).await;
    let player = harness.player_for("a");
    assert!(player.source_name().contains(".complete."));

    player.set_position(178_500);
    harness.settle().await;
    player.complete();

    harness.wait_for_index(Some(1)).await;
    harness.wait_for_state(PlayerState::Started).await;
    assert_eq!(count_calls(&player, "seek:178500"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_gapless_handoff_to_prepared_successor() {
    let harness = Harness::new().await;
    start_queue(&harness, &["a", "b"]).await;

    let first = harness.player_for("a");
    eventually("successor staged", || first.has_next()).await;
    assert_eq!(harness.players.created(), 2);

    first.complete();
    harness.wait_for_index(Some(1)).await;
    assert_eq!(harness.coordinator.player_state().await, PlayerState::Started);
    assert!(first.is_released());

    let second = harness.player_for("b");
    assert_eq!(count_calls(&second, "set_source"), 1);
    assert_eq!(harness.players.created(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_gapless_disabled_never_stages_successor() {
    let config = PlaybackConfig::default().with_gapless(false);
    let wait = config.successor_initial_delay + config.successor_poll_interval * 2;
    let harness = Harness::builder().config(config).build().await;
    start_queue(&harness, &["a", "b"]).await;

    tokio::time::sleep(wait).await;

    assert!(!harness.player_for("a").has_next());
    assert_eq!(harness.players.created(), 1);
    assert_eq!(harness.coordinator.next_player_state().await, NextPlayerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_successor_state_follows_its_download() {
    let harness = Harness::new().await;
    let mut events = harness.playback_events();
    let a = harness.tracks(&["a"], SMALL).remove(0);
    let b = harness.tracks(&["b"], 1_000_000).remove(0);
    harness.http.hold(&b.stream_uri, 1_000);
    harness
        .coordinator
        .enqueue(vec![a, b], EnqueueOptions::default().autoplay())
        .await
        .unwrap();
    harness.wait_for_state(PlayerState::Started).await;

    harness.wait_for_next_state(NextPlayerState::Downloading).await;
    assert!(!harness.player_for("a").has_next());

    harness.http.release(&url("b"));
    harness.wait_for_next_state(NextPlayerState::Prepared).await;
    assert!(harness.player_for("a").has_next());
    assert_eq!(
        common::drain_next_states(&mut events),
        vec!["downloading", "preparing", "prepared"]
    );

    harness.coordinator.next().await.unwrap();
    harness.wait_for_index(Some(1)).await;
    assert_eq!(harness.coordinator.next_player_state().await, NextPlayerState::Idle);
    assert_eq!(common::drain_next_states(&mut events), vec!["idle"]);
}

#[tokio::test(start_paused = true)]
async fn test_successor_staged_soon_after_its_file_completes() {
    let config = PlaybackConfig::default();
    let bound = config.successor_initial_delay + config.successor_poll_interval;
    let harness = Harness::new().await;
    let a = harness.tracks(&["a"], SMALL).remove(0);
    let b = harness.tracks(&["b"], 1_000_000).remove(0);
    harness.http.hold(&b.stream_uri, 1_000);
    harness
        .coordinator
        .enqueue(vec![a, b.clone()], EnqueueOptions::default().autoplay())
        .await
        .unwrap();
    harness.wait_for_state(PlayerState::Started).await;

    // Land the completion between two successor checks.
    tokio::time::sleep(config.successor_initial_delay + Duration::from_secs(2)).await;
    let first = harness.player_for("a");
    assert!(!first.has_next());

    harness.http.release(&url("b"));
    let entry = harness.coordinator.entry_for(&b).await.unwrap();
    eventually("b cached", || entry.is_complete_file_available()).await;

    let staged = tokio::time::timeout(bound, async {
        while !first.has_next() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(staged.is_ok(), "successor not staged within {bound:?}");
    assert_eq!(harness.coordinator.next_player_state().await, NextPlayerState::Prepared);
}

#[tokio::test(start_paused = true)]
async fn test_completion_clears_bookmark() {
    let deleted = Arc::new(Mutex::new(Vec::new()));
    let mut music = MockMusic::new();
    let log = Arc::clone(&deleted);
    music.expect_delete_bookmark().returning(move |id| {
        log.lock().push(id.to_string());
        Ok(())
    });

    let harness = Harness::builder()
        .config(PlaybackConfig::default().with_gapless(false))
        .music(music)
        .build()
        .await;
    let a = track("a", SMALL).with_bookmark_ms(30_000);
    harness.http.serve(&a.stream_uri, common::body(SMALL));
    harness
        .coordinator
        .enqueue(vec![a], EnqueueOptions::default().autoplay())
        .await
        .unwrap();
    harness.wait_for_state(PlayerState::Started).await;

    harness.player_for("a").complete();
    harness.wait_for_state(PlayerState::Idle).await;
    eventually("bookmark deleted", || deleted.lock().len() == 1).await;
    assert_eq!(deleted.lock()[0], "a");
}

#[tokio::test(start_paused = true)]
async fn test_scrobbles_once_per_track() {
    let scrobbles = Arc::new(Mutex::new(Vec::new()));
    let mut music = MockMusic::new();
    let log = Arc::clone(&scrobbles);
    music.expect_scrobble().returning(move |id, submission| {
        log.lock().push((id.to_string(), submission));
        Ok(())
    });
    music.expect_delete_bookmark().returning(|_| Ok(()));

    let harness = Harness::builder()
        .config(PlaybackConfig::default().with_gapless(false).with_scrobbling(true))
        .music(music)
        .build()
        .await;
    start_queue(&harness, &["a"]).await;

    harness.coordinator.pause().await.unwrap();
    harness.coordinator.start().await.unwrap();
    harness.player_for("a").complete();
    harness.wait_for_state(PlayerState::Idle).await;

    eventually("submission", || scrobbles.lock().len() == 2).await;
    assert_eq!(
        *scrobbles.lock(),
        vec![("a".to_string(), false), ("a".to_string(), true)]
    );
}
