//! Camera and microphone manager

use crate::capture::CaptureBackend;
use crate::constraints::MediaConstraints;
use crate::error::{MediaError, MediaResult};
use crate::source::{LocalMediaSource, MediaHandle, MediaStatus};
use async_trait::async_trait;
use meshrtc_core::TrackKind;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct ManagerState {
    handle: Option<MediaHandle>,
    last_constraints: Option<MediaConstraints>,
}

/// Owns the local capture lifecycle.
///
/// Acquisition is single-flight: concurrent callers wait for the first
/// capture and then share it, and later calls return the cached handle
/// until [`LocalMediaSource::release`] is called.
pub struct MediaManager {
    backend: Arc<dyn CaptureBackend>,
    acquire_lock: tokio::sync::Mutex<()>,
    state: RwLock<ManagerState>,
}

impl MediaManager {
    /// Create a manager over a capture backend
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            acquire_lock: tokio::sync::Mutex::new(()),
            state: RwLock::new(ManagerState::default()),
        }
    }

    /// Release and capture again with the last constraints used
    pub async fn restart(&self) -> MediaResult<MediaHandle> {
        let constraints = self
            .state
            .read()
            .last_constraints
            .clone()
            .unwrap_or_default();
        self.release();
        self.acquire(constraints).await
    }

    async fn capture_with_fallback(
        &self,
        constraints: &MediaConstraints,
    ) -> MediaResult<MediaHandle> {
        let mut last_error = MediaError::InvalidConfiguration {
            message: "no media kind requested".to_string(),
        };

        for (rung, attempt) in constraints.fallback_ladder().iter().enumerate() {
            match self.backend.open(attempt).await {
                Ok(tracks) => {
                    if rung > 0 {
                        info!(
                            video = attempt.video.is_some(),
                            audio = attempt.audio.is_some(),
                            "Capture fell back to fewer devices"
                        );
                    }
                    return Ok(MediaHandle::new(tracks));
                }
                Err(e) if e.is_recoverable() => {
                    warn!(rung, "Capture attempt failed: {}", e);
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(MediaError::AllFallbacksExhausted {
            last_error: last_error.to_string(),
        })
    }
}

impl std::fmt::Debug for MediaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaManager")
            .field("status", &self.status())
            .finish()
    }
}

#[async_trait]
impl LocalMediaSource for MediaManager {
    async fn acquire(&self, constraints: MediaConstraints) -> MediaResult<MediaHandle> {
        if let Some(handle) = self.current() {
            return Ok(handle);
        }

        let _guard = self.acquire_lock.lock().await;
        // Another caller may have finished while we waited
        if let Some(handle) = self.current() {
            return Ok(handle);
        }

        let result = self.capture_with_fallback(&constraints).await;
        let mut state = self.state.write();
        state.last_constraints = Some(constraints);
        match result {
            Ok(handle) => {
                info!(
                    video = handle.has(TrackKind::Video),
                    audio = handle.has(TrackKind::Audio),
                    "Local media acquired"
                );
                state.handle = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                warn!("Local media unavailable: {}", e);
                Err(e)
            }
        }
    }

    fn set_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        let state = self.state.read();
        match state.handle.as_ref().and_then(|handle| handle.track(kind)) {
            Some(track) => {
                track.set_enabled(enabled);
                debug!(%kind, enabled, "Track toggled");
                enabled
            }
            None => false,
        }
    }

    fn current(&self) -> Option<MediaHandle> {
        self.state.read().handle.clone()
    }

    fn release(&self) {
        if let Some(handle) = self.state.write().handle.take() {
            for track in &handle.tracks {
                track.stop();
            }
            info!(tracks = handle.tracks.len(), "Local media released");
        }
    }

    fn status(&self) -> MediaStatus {
        let state = self.state.read();
        let Some(handle) = state.handle.as_ref() else {
            return MediaStatus::default();
        };
        let enabled = |kind| handle.track(kind).is_some_and(|track| track.is_enabled());
        MediaStatus {
            initialized: true,
            has_video: handle.has(TrackKind::Video),
            has_audio: handle.has(TrackKind::Audio),
            video_enabled: enabled(TrackKind::Video),
            audio_enabled: enabled(TrackKind::Audio),
        }
    }
}
