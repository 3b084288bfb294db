//! Tests for local media acquisition
//!
//! Covers the device fallback ladder, single-flight acquisition, track
//! toggling and release.

use meshrtc_core::TrackKind;
use meshrtc_media::*;
use std::sync::Arc;
use std::time::Duration;

fn manager_with(backend: SimulatedCapture) -> (Arc<SimulatedCapture>, MediaManager) {
    let backend = Arc::new(backend);
    let manager = MediaManager::new(backend.clone());
    (backend, manager)
}

// ============================================================================
// FALLBACK LADDER TESTS
// ============================================================================

#[tokio::test]
async fn test_acquire_camera_and_microphone() {
    let (backend, manager) = manager_with(SimulatedCapture::new());

    let handle = manager.acquire(MediaConstraints::default()).await.unwrap();
    assert!(handle.has(TrackKind::Video));
    assert!(handle.has(TrackKind::Audio));
    assert_eq!(backend.open_calls(), 1);

    let status = manager.status();
    assert!(status.initialized);
    assert!(status.video_enabled);
    assert!(status.audio_enabled);
}

#[tokio::test]
async fn test_falls_back_to_video_only() {
    let (backend, manager) = manager_with(SimulatedCapture::new().with_microphone(false));

    let handle = manager.acquire(MediaConstraints::default()).await.unwrap();
    assert!(handle.has(TrackKind::Video));
    assert!(!handle.has(TrackKind::Audio));
    // Full request, then video only
    assert_eq!(backend.open_calls(), 2);
}

#[tokio::test]
async fn test_falls_back_to_audio_only() {
    let (backend, manager) = manager_with(SimulatedCapture::new().with_camera(false));

    let handle = manager.acquire(MediaConstraints::default()).await.unwrap();
    assert!(!handle.has(TrackKind::Video));
    assert!(handle.has(TrackKind::Audio));
    assert_eq!(backend.open_calls(), 3);
}

#[tokio::test]
async fn test_all_fallbacks_exhausted() {
    let (_backend, manager) = manager_with(
        SimulatedCapture::new()
            .with_camera(false)
            .with_microphone(false),
    );

    let err = manager
        .acquire(MediaConstraints::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::AllFallbacksExhausted { .. }));
    assert!(!manager.status().initialized);
    assert!(manager.current().is_none());
}

#[tokio::test]
async fn test_denied_camera_falls_back_to_audio() {
    let (backend, manager) =
        manager_with(SimulatedCapture::new().with_camera_permission(false));

    let handle = tokio_test::assert_ok!(manager.acquire(MediaConstraints::default()).await);
    assert!(!handle.has(TrackKind::Video));
    assert!(handle.has(TrackKind::Audio));
    assert_eq!(backend.open_calls(), 3);
}

#[tokio::test]
async fn test_busy_microphone_reported_when_nothing_else_works() {
    let (backend, manager) = manager_with(SimulatedCapture::new().with_camera(false));
    backend.set_microphone_busy(true);

    let err = tokio_test::assert_err!(manager.acquire(MediaConstraints::default()).await);
    match err {
        MediaError::AllFallbacksExhausted { last_error } => {
            assert!(last_error.starts_with("Device busy: audio"), "{}", last_error);
        }
        other => panic!("unexpected error {:?}", other),
    }

    // Freed by the other application
    backend.set_microphone_busy(false);
    let handle = tokio_test::assert_ok!(manager.acquire(MediaConstraints::default()).await);
    assert!(handle.has(TrackKind::Audio));
}

#[tokio::test]
async fn test_audio_only_request_does_not_try_video() {
    let (backend, manager) = manager_with(SimulatedCapture::new().with_microphone(false));
    let constraints = MediaConstraints {
        video: None,
        audio: Some(AudioConstraints::default()),
    };

    assert!(manager.acquire(constraints).await.is_err());
    assert_eq!(backend.open_calls(), 1);
}

// ============================================================================
// LIFECYCLE TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquire_is_single_flight() {
    let (backend, manager) = manager_with(
        SimulatedCapture::new().with_open_delay(Duration::from_millis(200)),
    );
    let manager = Arc::new(manager);

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.acquire(MediaConstraints::default()).await }
    });
    let second = tokio::spawn({
        let manager = manager.clone();
        async move { manager.acquire(MediaConstraints::default()).await }
    });

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(backend.open_calls(), 1);
}

#[tokio::test]
async fn test_toggle_tracks() {
    let (_backend, manager) = manager_with(SimulatedCapture::new());
    let handle = manager.acquire(MediaConstraints::default()).await.unwrap();

    assert!(!manager.set_enabled(TrackKind::Audio, false));
    assert!(!handle.track(TrackKind::Audio).unwrap().is_enabled());
    assert!(!manager.status().audio_enabled);
    assert!(manager.status().video_enabled);

    assert!(manager.set_enabled(TrackKind::Audio, true));
    assert!(handle.track(TrackKind::Audio).unwrap().is_enabled());
}

#[tokio::test]
async fn test_toggle_missing_track_reports_disabled() {
    let (_backend, manager) = manager_with(SimulatedCapture::new().with_camera(false));
    manager.acquire(MediaConstraints::default()).await.unwrap();
    assert!(!manager.set_enabled(TrackKind::Video, true));
}

#[tokio::test]
async fn test_release_stops_tracks() {
    let (_backend, manager) = manager_with(SimulatedCapture::new());
    let handle = manager.acquire(MediaConstraints::default()).await.unwrap();

    manager.release();
    assert!(handle.tracks.iter().all(|track| track.is_stopped()));
    assert_eq!(manager.status(), MediaStatus::default());

    // Releasing twice is harmless
    manager.release();
}

#[tokio::test]
async fn test_restart_recaptures_with_last_constraints() {
    let (backend, manager) = manager_with(SimulatedCapture::new().with_camera(false));
    let first = manager.acquire(MediaConstraints::default()).await.unwrap();
    assert!(!first.has(TrackKind::Video));

    backend.set_camera_available(true);
    let second = manager.restart().await.unwrap();
    assert_ne!(first.id, second.id);
    assert!(second.has(TrackKind::Video));
    assert!(first.tracks.iter().all(|track| track.is_stopped()));
}
