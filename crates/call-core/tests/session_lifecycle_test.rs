//! Start / end lifecycle of a call session against recording fakes

mod common;

use std::sync::atomic::Ordering;

use common::*;
use telecare_call_core::{
    AcquisitionTier, CallConfig, CallError, CallRecordId, CallState, ChannelMode, MediaKind,
    PublishTier, RtcClientConfig, RtcError, SessionEvent, SurfaceId, VideoCodec,
};

#[tokio::test]
async fn test_full_hardware_reaches_connected_av() {
    let h = Harness::default();
    let session = h.session();
    let mut states = Vec::new();
    let mut events = session.subscribe();

    let tier = session.start(descriptor()).await.unwrap();

    assert_eq!(tier, PublishTier::AudioVideo);
    assert_eq!(session.state(), CallState::Connected(PublishTier::AudioVideo));
    assert_eq!(h.client.calls(), vec!["join:consult-1:patient-7", "publish:2"]);

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::StateChanged { current, .. } = event {
            states.push(current);
        }
    }
    assert_eq!(
        states,
        vec![CallState::Joining, CallState::Connected(PublishTier::AudioVideo)]
    );
}

#[tokio::test]
async fn test_client_created_with_configured_mode_and_codec() {
    let h = Harness::default();
    let config = CallConfig::new().with_client(RtcClientConfig {
        mode: ChannelMode::Live,
        codec: VideoCodec::H264,
    });
    let session = h.builder().config(config).build();

    session.start(descriptor()).await.unwrap();

    let used = (*h.provider.last_config.lock()).unwrap();
    assert_eq!(used.mode, ChannelMode::Live);
    assert_eq!(used.codec, VideoCodec::H264);
}

#[tokio::test]
async fn test_missing_camera_falls_back_to_audio_only() {
    let h = Harness::new(FakeDevices::new(false, true));
    let session = h.session();
    let mut events = session.subscribe();

    let tier = session.start(descriptor()).await.unwrap();

    assert_eq!(tier, PublishTier::AudioOnly);
    assert_eq!(h.client.count("publish:1"), 1);
    assert_eq!(session.is_video_enabled(), None);
    assert_eq!(session.is_audio_enabled(), Some(true));

    let degraded = std::iter::from_fn(|| events.try_recv().ok())
        .find_map(|event| match event {
            SessionEvent::MediaDegraded { tier, failures, .. } => Some((tier, failures)),
            _ => None,
        })
        .expect("degradation event");
    assert_eq!(degraded.0, PublishTier::AudioOnly);
    assert_eq!(degraded.1[0].tier, AcquisitionTier::CameraAndMicrophone);
}

#[tokio::test]
async fn test_no_devices_joins_receive_only_without_publishing() {
    let h = Harness::new(FakeDevices::new(false, false));
    let session = h.session();

    let tier = session.start(descriptor()).await.unwrap();

    assert_eq!(tier, PublishTier::None);
    assert_eq!(session.state(), CallState::Connected(PublishTier::None));
    assert_eq!(h.client.count("publish"), 0);
    assert_eq!(h.client.count("join"), 1);
    assert!(session.snapshot().is_waiting_for_remote());
}

#[tokio::test]
async fn test_audio_only_config_never_touches_camera() {
    let h = Harness::default();
    let session = h.builder().config(CallConfig::new().audio_only()).build();

    let tier = session.start(descriptor()).await.unwrap();

    assert_eq!(tier, PublishTier::AudioOnly);
    assert_eq!(h.devices.request_count(), 1);
}

#[tokio::test]
async fn test_publish_failure_degrades_to_receive_only() {
    let h = Harness::default();
    h.client.fail_publish();
    let session = h.session();

    let tier = session.start(descriptor()).await.unwrap();

    assert_eq!(tier, PublishTier::None);
    assert_eq!(h.devices.audio.close_count(), 1);
    assert_eq!(h.devices.video.close_count(), 1);
    assert_eq!(session.is_audio_enabled(), None);
}

#[tokio::test]
async fn test_local_preview_mirrors_camera() {
    let h = Harness::default();
    let session = h
        .builder()
        .config(CallConfig::new().with_local_preview("local-preview"))
        .build();

    session.start(descriptor()).await.unwrap();

    assert_eq!(*h.devices.video.played_on.lock(), vec![SurfaceId::from("local-preview")]);
}

#[tokio::test]
async fn test_join_rejection_fails_session() {
    let h = Harness::default();
    h.client.reject_join(RtcError::provider("join", "invalid token"));
    let session = h.session();

    let err = session.start(descriptor()).await.unwrap_err();

    match &err {
        CallError::Join(join) => assert_eq!(join.channel, "consult-1"),
        other => panic!("Expected join error, got {:?}", other),
    }
    assert!(err.is_user_visible());
    assert_eq!(session.state(), CallState::Failed);
    assert_eq!(h.devices.request_count(), 0, "no media acquired after a failed join");
    assert_eq!(h.client.count("publish"), 0);

    // retrying needs a fresh session
    let retry = session.start(descriptor()).await.unwrap_err();
    assert!(matches!(retry, CallError::InvalidState { state: CallState::Failed, .. }));
}

#[tokio::test]
async fn test_duplicate_start_is_rejected() {
    let h = Harness::default();
    let session = h.session();
    session.start(descriptor()).await.unwrap();

    let err = session.start(descriptor()).await.unwrap_err();

    assert!(matches!(err, CallError::InvalidState { operation: "start", .. }));
    assert_eq!(h.client.count("join"), 1);
}

#[tokio::test]
async fn test_end_releases_before_leaving_and_is_idempotent() {
    let h = Harness::default();
    let session = h.session();
    session.start(descriptor()).await.unwrap();

    let report = session.end().await;

    assert!(report.is_clean());
    assert!(report.left);
    assert_eq!(report.released_tracks, 2);
    assert_eq!(session.state(), CallState::Ended);
    assert_eq!(
        h.client.calls(),
        vec!["join:consult-1:patient-7", "publish:2", "unpublish:2", "leave"]
    );
    assert_eq!(h.devices.audio.close_count(), 1);

    let second = session.end().await;
    assert!(!second.left);
    assert_eq!(second.released_tracks, 0);
    assert_eq!(h.client.count("leave"), 1);
    assert_eq!(h.devices.audio.close_count(), 1);
}

#[tokio::test]
async fn test_end_before_start_goes_straight_to_ended() {
    let h = Harness::default();
    let session = h.session();

    session.end().await;

    assert_eq!(session.state(), CallState::Ended);
    assert_eq!(h.provider.created.load(Ordering::SeqCst), 0);
    assert!(session.start(descriptor()).await.is_err());
}

#[tokio::test]
async fn test_leave_failure_still_ends_session() {
    let h = Harness::default();
    h.client.fail_leave();
    let session = h.session();
    let mut events = session.subscribe();
    session.start(descriptor()).await.unwrap();

    let report = session.end().await;

    assert_eq!(report.errors.len(), 1);
    assert!(!report.left);
    assert_eq!(session.state(), CallState::Ended);
    let ended = std::iter::from_fn(|| events.try_recv().ok())
        .find_map(|event| match event {
            SessionEvent::Ended { teardown_errors, .. } => Some(teardown_errors),
            _ => None,
        });
    assert_eq!(ended, Some(1));
}

#[tokio::test]
async fn test_toggles_keep_tracks_published() {
    let h = Harness::default();
    let session = h.session();

    let err = session.set_audio_enabled(false).unwrap_err();
    assert!(matches!(err, CallError::InvalidState { state: CallState::Idle, .. }));

    session.start(descriptor()).await.unwrap();
    let mut events = session.subscribe();

    assert!(session.set_audio_enabled(false).unwrap());
    assert!(session.set_video_enabled(false).unwrap());

    assert_eq!(session.is_audio_enabled(), Some(false));
    assert_eq!(session.is_video_enabled(), Some(false));
    assert!(!h.devices.audio.enabled.load(Ordering::SeqCst));
    assert_eq!(h.client.count("unpublish"), 0);

    let toggled: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            SessionEvent::LocalTrackToggled { kind, enabled, .. } => Some((kind, enabled)),
            _ => None,
        })
        .collect();
    assert_eq!(toggled, vec![(MediaKind::Audio, false), (MediaKind::Video, false)]);

    assert!(session.set_audio_enabled(true).unwrap());
    assert_eq!(session.snapshot().audio_enabled, Some(true));
}

#[tokio::test]
async fn test_video_toggle_without_camera_is_a_noop() {
    let h = Harness::new(FakeDevices::new(false, true));
    let session = h.session();
    session.start(descriptor()).await.unwrap();

    assert!(!session.set_video_enabled(false).unwrap());
}

#[tokio::test]
async fn test_lifecycle_reports_bracket_the_call() {
    let h = Harness::default();
    let records = FakeRecords::new();
    let session = h
        .builder()
        .lifecycle(records.clone(), CallRecordId::from("vc-1"))
        .build();

    session.start(descriptor()).await.unwrap();
    wait_until(|| records.calls().len() == 1).await;

    let report = session.end().await;

    assert_eq!(report.end_reported, Some(true));
    assert_eq!(records.calls(), vec!["start:vc-1", "end:vc-1"]);
}

#[tokio::test]
async fn test_failed_end_report_does_not_block_teardown() {
    let h = Harness::default();
    let records = FakeRecords::new();
    records.fail.store(true, Ordering::SeqCst);
    let session = h
        .builder()
        .lifecycle(records.clone(), CallRecordId::from("vc-2"))
        .build();

    session.start(descriptor()).await.unwrap();
    let report = session.end().await;

    assert_eq!(report.end_reported, Some(false));
    assert_eq!(session.state(), CallState::Ended);
    assert_eq!(records.calls(), vec!["start:vc-2", "end:vc-2"]);
}

#[tokio::test]
async fn test_no_end_report_without_start() {
    let h = Harness::default();
    h.client.reject_join(RtcError::provider("join", "expired"));
    let records = FakeRecords::new();
    let session = h
        .builder()
        .lifecycle(records.clone(), CallRecordId::from("vc-3"))
        .build();

    assert!(session.start(descriptor()).await.is_err());
    session.end().await;

    assert!(records.calls().is_empty());
}

#[tokio::test]
async fn test_wait_until_terminal_resolves_after_end() {
    let h = Harness::default();
    let session = h.session();
    session.start(descriptor()).await.unwrap();

    let waiter = {
        let session = session.clone();
        tokio::spawn(async move { session.wait_until_terminal().await })
    };
    session.end().await;

    assert_eq!(waiter.await.unwrap(), CallState::Ended);
}
