//! Local media source contract consumed by the orchestration layer

use crate::constraints::MediaConstraints;
use crate::error::MediaResult;
use async_trait::async_trait;
use meshrtc_core::{MediaTrack, TrackKind};
use serde::{Deserialize, Serialize};

/// Ready-to-attach local capture
#[derive(Debug, Clone)]
pub struct MediaHandle {
    /// Stream ID
    pub id: String,
    /// Captured tracks, at most one per kind
    pub tracks: Vec<MediaTrack>,
}

impl MediaHandle {
    /// Wrap freshly opened tracks
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// First track of a kind
    pub fn track(&self, kind: TrackKind) -> Option<&MediaTrack> {
        self.tracks.iter().find(|track| track.kind() == kind)
    }

    /// Whether a track of this kind was captured
    pub fn has(&self, kind: TrackKind) -> bool {
        self.track(kind).is_some()
    }
}

/// Snapshot of the local capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaStatus {
    /// Capture acquired
    pub initialized: bool,
    /// A video track exists
    pub has_video: bool,
    /// An audio track exists
    pub has_audio: bool,
    /// Video track is producing frames
    pub video_enabled: bool,
    /// Audio track is producing samples
    pub audio_enabled: bool,
}

/// Local capture, shared read-only by every peer transport
#[async_trait]
pub trait LocalMediaSource: Send + Sync {
    /// Acquire capture, walking the device fallback ladder
    async fn acquire(&self, constraints: MediaConstraints) -> MediaResult<MediaHandle>;

    /// Enable or disable the track of a kind; returns the resulting state
    fn set_enabled(&self, kind: TrackKind, enabled: bool) -> bool;

    /// Current capture, if acquired
    fn current(&self) -> Option<MediaHandle>;

    /// Stop every track and forget the capture
    fn release(&self);

    /// Capture state
    fn status(&self) -> MediaStatus;
}
