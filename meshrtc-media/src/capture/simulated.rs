use super::CaptureBackend;
use crate::constraints::MediaConstraints;
use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use meshrtc_core::{MediaTrack, TrackKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// In-process capture backend with configurable device availability
#[derive(Debug)]
pub struct SimulatedCapture {
    camera_available: AtomicBool,
    camera_permitted: AtomicBool,
    microphone_available: AtomicBool,
    microphone_busy: AtomicBool,
    open_delay: Duration,
    open_calls: AtomicUsize,
}

impl SimulatedCapture {
    /// Backend with both a camera and a microphone
    pub fn new() -> Self {
        Self {
            camera_available: AtomicBool::new(true),
            camera_permitted: AtomicBool::new(true),
            microphone_available: AtomicBool::new(true),
            microphone_busy: AtomicBool::new(false),
            open_delay: Duration::ZERO,
            open_calls: AtomicUsize::new(0),
        }
    }

    /// Set whether the camera can be opened
    pub fn with_camera(self, available: bool) -> Self {
        self.camera_available.store(available, Ordering::SeqCst);
        self
    }

    /// Set whether the user grants camera access
    pub fn with_camera_permission(self, granted: bool) -> Self {
        self.camera_permitted.store(granted, Ordering::SeqCst);
        self
    }

    /// Set whether the microphone can be opened
    pub fn with_microphone(self, available: bool) -> Self {
        self.microphone_available.store(available, Ordering::SeqCst);
        self
    }

    /// Delay every open, to simulate a permission prompt
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Plug or unplug the camera
    pub fn set_camera_available(&self, available: bool) {
        self.camera_available.store(available, Ordering::SeqCst);
    }

    /// Mark the microphone as held by another application
    pub fn set_microphone_busy(&self, busy: bool) {
        self.microphone_busy.store(busy, Ordering::SeqCst);
    }

    /// Number of times a capture was attempted
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for SimulatedCapture {
    async fn open(&self, constraints: &MediaConstraints) -> MediaResult<Vec<MediaTrack>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        let mut tracks = Vec::new();
        if constraints.video.is_some() {
            if !self.camera_available.load(Ordering::SeqCst) {
                return Err(MediaError::DeviceNotFound {
                    kind: TrackKind::Video,
                });
            }
            if !self.camera_permitted.load(Ordering::SeqCst) {
                return Err(MediaError::PermissionDenied {
                    operation: "camera access".to_string(),
                });
            }
            tracks.push(MediaTrack::new(TrackKind::Video, "Simulated Camera"));
        }
        if constraints.audio.is_some() {
            if !self.microphone_available.load(Ordering::SeqCst) {
                return Err(MediaError::DeviceNotFound {
                    kind: TrackKind::Audio,
                });
            }
            if self.microphone_busy.load(Ordering::SeqCst) {
                return Err(MediaError::DeviceBusy {
                    kind: TrackKind::Audio,
                    reason: "in use by another application".to_string(),
                });
            }
            tracks.push(MediaTrack::new(TrackKind::Audio, "Simulated Microphone"));
        }

        if tracks.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "no media kind requested".to_string(),
            });
        }
        Ok(tracks)
    }
}
