//! Identification Orchestrator integration tests
//!
//! Drives the real extractor and cache through scripted capture and
//! provider seams.

mod helpers;

use helpers::{answer, tone_clip, tone_samples, wait_until, Harness, ScriptedBackend, StaticClipSource, ToneConfig};
use songid_common::events::{IdentificationOutcome, SongIdEvent};
use songid_listener::services::{
    AutoListener, CaptureController, CaptureError, FileAudioSource, ListeningSettings, Phase,
    ProviderAnswer, RemoteError, SettingsUpdate, TriggerRejection,
};
use songid_listener::types::{EncodedAudio, FeatureSet, MatchSource, SongIdentification};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

fn default_clip() -> EncodedAudio {
    tone_clip(&ToneConfig::default())
}

fn default_features() -> FeatureSet {
    ToneConfig::default().expected_features()
}

/// Wait for the `IdentificationFinished` event of `token`
async fn finished_outcome(
    rx: &mut broadcast::Receiver<SongIdEvent>,
    token: u64,
) -> IdentificationOutcome {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SongIdEvent::IdentificationFinished {
                token: finished,
                outcome,
                ..
            }) = rx.recv().await
            {
                if finished == token {
                    return outcome;
                }
            }
        }
    })
    .await
    .expect("attempt did not finish")
}

fn drain(rx: &mut broadcast::Receiver<SongIdEvent>) -> Vec<SongIdEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Pipeline paths
// ============================================================================

#[tokio::test]
async fn test_remote_answer_published_and_cached_as_local() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::answering("Song X", "Band"),
    );

    let song = h.orchestrator.identify_now().await.unwrap().unwrap();

    assert_eq!(song.title, "Song X");
    assert_eq!(song.match_source, MatchSource::Remote);
    assert_eq!(h.orchestrator.current(), Some(song));
    assert!(!h.orchestrator.is_identifying());
    assert_eq!(h.orchestrator.phase(), Phase::Idle);
    assert_eq!(h.backend.calls(), 1);

    let entries = h.cache.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].features, default_features());
    assert_eq!(entries[0].song.match_source, MatchSource::Local);
    assert_eq!(entries[0].song.title, "Song X");
}

#[tokio::test]
async fn test_cache_hit_skips_remote() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::answering("Wrong", "Wrong"),
    );
    // 5 of 7 bins shared with the clip
    h.cache
        .store(
            &FeatureSet::from([5, 9, 14, 20, 27, 40]),
            &SongIdentification::identified("Song X", "Band", MatchSource::Remote),
        )
        .await
        .unwrap();

    let song = h.orchestrator.identify_now().await.unwrap().unwrap();

    assert_eq!(song.title, "Song X");
    assert_eq!(song.match_source, MatchSource::Local);
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.orchestrator.current(), Some(song));
}

#[tokio::test]
async fn test_cache_miss_falls_back_to_remote() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::answering("Song X", "Band"),
    );
    h.cache
        .store(
            &FeatureSet::from([40, 41, 42, 43, 44]),
            &SongIdentification::identified("Song Y", "Other Band", MatchSource::Remote),
        )
        .await
        .unwrap();

    let song = h.orchestrator.identify_now().await.unwrap().unwrap();

    assert_eq!(song.match_source, MatchSource::Remote);
    assert_eq!(h.backend.calls(), 1);

    let titles: Vec<String> = h.cache.entries().await.into_iter().map(|e| e.song.title).collect();
    assert_eq!(titles, vec!["Song X", "Song Y"]);
}

#[tokio::test]
async fn test_repeat_listen_is_answered_locally() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::answering("Song X", "Band"),
    );

    let first = h.orchestrator.identify_now().await.unwrap().unwrap();
    let second = h.orchestrator.identify_now().await.unwrap().unwrap();

    assert_eq!(first.match_source, MatchSource::Remote);
    assert_eq!(second.match_source, MatchSource::Local);
    assert_eq!(second.title, "Song X");
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn test_undecodable_clip_goes_remote_without_caching() {
    let h = Harness::new(
        StaticClipSource::ok(EncodedAudio::wav(vec![0u8; 64])),
        ScriptedBackend::answering("Song X", "Band"),
    );

    let song = h.orchestrator.identify_now().await.unwrap().unwrap();

    assert_eq!(song.match_source, MatchSource::Remote);
    assert_eq!(h.backend.calls(), 1);
    assert!(h.cache.is_empty().await);
}

#[tokio::test]
async fn test_listening_settings_reach_the_provider() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::answering("Song X", "Band"),
    );
    h.orchestrator.update_settings(SettingsUpdate {
        language: Some("French".to_string()),
        region: Some("FR".to_string()),
        ..Default::default()
    });

    h.orchestrator.identify_now().await.unwrap();

    let requests = h.backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].target_language, "French");
    assert_eq!(requests[0].target_region, "FR");
    assert_eq!(requests[0].mime_type, "audio/wav");
    assert!(requests[0].instructions.contains("French"));
}

// ============================================================================
// Failure paths
// ============================================================================

#[tokio::test]
async fn test_capture_failure_finishes_without_remote_call() {
    let clips = StaticClipSource::failing(CaptureError::StreamEnded);
    let h = Harness::new(clips.clone(), ScriptedBackend::answering("Song X", "Band"));
    let mut rx = h.event_bus.subscribe();

    let result = h.orchestrator.identify_now().await.unwrap();

    assert_eq!(result, None);
    assert_eq!(clips.calls(), 1);
    assert_eq!(h.backend.calls(), 0);
    assert!(!h.orchestrator.is_identifying());
    let token = h.orchestrator.live_token().value();
    assert_eq!(finished_outcome(&mut rx, token).await, IdentificationOutcome::CaptureFailed);
}

#[tokio::test]
async fn test_not_identified_keeps_previous_song() {
    let backend = ScriptedBackend::always(Ok(ProviderAnswer {
        identified: false,
        ..Default::default()
    }));
    backend.push(Ok(answer("Song A", "Band A")));
    let h = Harness::new(StaticClipSource::ok(default_clip()), backend);

    let first = h.orchestrator.identify_now().await.unwrap().unwrap();
    h.cache.clear().await.unwrap();
    let second = h.orchestrator.identify_now().await.unwrap();

    assert_eq!(second, None);
    assert_eq!(h.orchestrator.current(), Some(first));
    assert_eq!(h.backend.calls(), 2);
    assert!(h.cache.is_empty().await);
    assert!(!h.orchestrator.is_identifying());
}

#[tokio::test]
async fn test_unconfirmed_answer_is_neither_published_nor_cached() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::answering("Song X", "   "),
    );

    assert_eq!(h.orchestrator.identify_now().await.unwrap(), None);
    assert_eq!(h.orchestrator.current(), None);
    assert!(h.cache.is_empty().await);
}

#[tokio::test]
async fn test_transient_failures_retried_then_published() {
    let backend = ScriptedBackend::answering("Song X", "Band");
    backend.push(Err(RemoteError::Transient("503".to_string())));
    backend.push(Err(RemoteError::Transient("timeout".to_string())));
    let h = Harness::new(StaticClipSource::ok(default_clip()), backend);

    let song = h.orchestrator.identify_now().await.unwrap().unwrap();

    assert_eq!(song.title, "Song X");
    assert_eq!(h.backend.calls(), 3);
}

#[tokio::test]
async fn test_quota_exceeded_is_not_retried() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::always(Err(RemoteError::QuotaExceeded("429".to_string()))),
    );
    let mut rx = h.event_bus.subscribe();

    assert_eq!(h.orchestrator.identify_now().await.unwrap(), None);
    assert_eq!(h.backend.calls(), 1);
    assert!(!h.orchestrator.is_identifying());

    let token = h.orchestrator.live_token().value();
    assert_eq!(finished_outcome(&mut rx, token).await, IdentificationOutcome::NotIdentified);
}

#[tokio::test]
async fn test_exhausted_retries_resolve_to_not_identified() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::always(Err(RemoteError::Transient("503".to_string()))),
    );

    assert_eq!(h.orchestrator.identify_now().await.unwrap(), None);
    assert_eq!(h.backend.calls(), 4);
}

// ============================================================================
// Single-flight & staleness
// ============================================================================

#[tokio::test]
async fn test_trigger_rejected_while_in_flight() {
    let backend = ScriptedBackend::answering("Unused", "Unused");
    let gate = backend.push_gated(Ok(answer("Song X", "Band")));
    let clips = StaticClipSource::ok(default_clip());
    let h = Harness::new(clips.clone(), backend);

    h.orchestrator.trigger().unwrap();
    wait_until(|| h.orchestrator.phase() == Phase::RemoteCall).await;

    assert!(h.orchestrator.is_identifying());
    assert_eq!(h.orchestrator.trigger(), Err(TriggerRejection::InFlight));
    assert_eq!(h.orchestrator.identify_now().await, Err(TriggerRejection::InFlight));
    assert_eq!(clips.calls(), 1);

    gate.notify_one();
    wait_until(|| !h.orchestrator.is_identifying()).await;

    assert_eq!(h.orchestrator.current().unwrap().title, "Song X");
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn test_abandoned_identify_now_still_clears_in_flight() {
    let backend = ScriptedBackend::answering("Unused", "Unused");
    let gate = backend.push_gated(Ok(answer("Song X", "Band")));
    let h = Harness::new(StaticClipSource::ok(default_clip()), backend);

    let waited = tokio::time::timeout(Duration::from_millis(200), h.orchestrator.identify_now()).await;
    assert!(waited.is_err());
    assert!(h.orchestrator.is_identifying());

    gate.notify_one();
    wait_until(|| !h.orchestrator.is_identifying()).await;
    assert_eq!(h.orchestrator.phase(), Phase::Idle);
    assert_eq!(h.orchestrator.current().unwrap().title, "Song X");

    // The orchestrator accepts the next attempt
    let next = h.orchestrator.identify_now().await.unwrap().unwrap();
    assert_eq!(next.title, "Song X");
    assert_eq!(next.match_source, MatchSource::Local);
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn test_disabled_trigger_does_nothing() {
    let clips = StaticClipSource::ok(default_clip());
    let h = Harness::with_settings(
        clips.clone(),
        ScriptedBackend::answering("Song X", "Band"),
        ListeningSettings {
            enabled: false,
            ..Default::default()
        },
    );

    assert_eq!(h.orchestrator.trigger(), Err(TriggerRejection::Disabled));
    assert_eq!(clips.calls(), 0);
    assert!(!h.orchestrator.is_identifying());
}

#[tokio::test]
async fn test_result_after_disable_and_reenable_is_discarded() {
    let backend = ScriptedBackend::answering("Song B", "Band B");
    let gate = backend.push_gated(Ok(answer("Song A", "Band A")));
    let h = Harness::new(StaticClipSource::ok(default_clip()), backend);
    let mut rx = h.event_bus.subscribe();

    let t1 = h.orchestrator.trigger().unwrap();
    wait_until(|| h.orchestrator.phase() == Phase::RemoteCall).await;

    h.orchestrator.update_settings(SettingsUpdate {
        enabled: Some(false),
        ..Default::default()
    });
    assert!(!h.orchestrator.is_identifying());
    assert_eq!(h.orchestrator.phase(), Phase::Idle);

    h.orchestrator.update_settings(SettingsUpdate {
        enabled: Some(true),
        ..Default::default()
    });
    let song_b = h.orchestrator.identify_now().await.unwrap().unwrap();
    assert_eq!(song_b.title, "Song B");

    gate.notify_one();
    assert_eq!(finished_outcome(&mut rx, t1.value()).await, IdentificationOutcome::Stale);

    assert_eq!(h.orchestrator.current(), Some(song_b));
    assert!(!h.orchestrator.is_identifying());
    assert!(h.orchestrator.live_token() > t1);

    // The stale attempt still taught the cache
    let titles: Vec<String> = h.cache.entries().await.into_iter().map(|e| e.song.title).collect();
    assert!(titles.contains(&"Song A".to_string()));
}

#[tokio::test]
async fn test_shutdown_discards_in_flight_result() {
    let backend = ScriptedBackend::answering("Unused", "Unused");
    let gate = backend.push_gated(Ok(answer("Song X", "Band")));
    let h = Harness::new(StaticClipSource::ok(default_clip()), backend);
    let mut rx = h.event_bus.subscribe();

    let token = h.orchestrator.trigger().unwrap();
    wait_until(|| h.orchestrator.phase() == Phase::RemoteCall).await;

    h.orchestrator.shutdown();
    assert!(!h.orchestrator.is_identifying());
    assert_eq!(h.orchestrator.trigger(), Err(TriggerRejection::ShutDown));

    gate.notify_one();
    assert_eq!(finished_outcome(&mut rx, token.value()).await, IdentificationOutcome::Stale);
    assert_eq!(h.orchestrator.current(), None);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_events_for_successful_attempt() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::answering("Song X", "Band"),
    );
    let mut rx = h.event_bus.subscribe();

    h.orchestrator.identify_now().await.unwrap();
    let token = h.orchestrator.live_token().value();
    let events = drain(&mut rx);

    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], SongIdEvent::IdentificationStarted { token: t, .. } if t == token));
    match &events[1] {
        SongIdEvent::SongIdentified { token: t, song, .. } => {
            assert_eq!(*t, token);
            assert_eq!(song.title, "Song X");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(
        events[2],
        SongIdEvent::IdentificationFinished {
            outcome: IdentificationOutcome::Identified,
            ..
        }
    ));
}

#[tokio::test]
async fn test_settings_change_is_broadcast() {
    let h = Harness::new(
        StaticClipSource::ok(default_clip()),
        ScriptedBackend::answering("Song X", "Band"),
    );
    let mut rx = h.event_bus.subscribe();

    let settings = h.orchestrator.update_settings(SettingsUpdate {
        region: Some("JP".to_string()),
        ..Default::default()
    });

    assert_eq!(settings.region, "JP");
    assert_eq!(settings.language, "English");
    match rx.try_recv().unwrap() {
        SongIdEvent::ListeningSettingsChanged { enabled, region, .. } => {
            assert!(enabled);
            assert_eq!(region, "JP");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

// ============================================================================
// Auto listener & live capture
// ============================================================================

#[tokio::test]
async fn test_auto_listener_identifies_periodically() {
    let clips = StaticClipSource::ok(default_clip());
    let h = Harness::new(clips.clone(), ScriptedBackend::answering("Song X", "Band"));
    let cancel = CancellationToken::new();

    let handle =
        AutoListener::new(h.orchestrator.clone(), Duration::from_millis(20)).spawn(cancel.clone());

    wait_until(|| clips.calls() >= 2).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(h.orchestrator.current().unwrap().title, "Song X");
    // Later ticks are answered from the cache
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn test_auto_listener_idle_while_disabled_and_stops_on_shutdown() {
    let clips = StaticClipSource::ok(default_clip());
    let h = Harness::with_settings(
        clips.clone(),
        ScriptedBackend::answering("Song X", "Band"),
        ListeningSettings {
            enabled: false,
            ..Default::default()
        },
    );

    let handle = AutoListener::new(h.orchestrator.clone(), Duration::from_millis(10))
        .spawn(CancellationToken::new());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(clips.calls(), 0);

    h.orchestrator.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("auto listener kept running after shutdown")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_identify_from_live_stream() {
    let tones = ToneConfig {
        bins: vec![6, 11, 17, 23, 30],
        seconds_per_tone: 0.6,
        ..Default::default()
    };
    let source = FileAudioSource::from_samples(tone_samples(&tones), 44100, false)
        .wait_for_listener(true);
    let capture = CaptureController::new(source.stream(), 3000);
    let h = Harness::new(Arc::new(capture), ScriptedBackend::answering("Song X", "Band"));

    let cancel = CancellationToken::new();
    let source_task = source.spawn(cancel.clone());

    let song = h.orchestrator.identify_now().await.unwrap().unwrap();
    cancel.cancel();
    source_task.await.unwrap();

    assert_eq!(song.match_source, MatchSource::Remote);
    let entries = h.cache.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].features, tones.expected_features());
}
