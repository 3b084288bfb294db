//! Capture constraints and resolution tiers

use meshrtc_core::TrackKind;
use serde::{Deserialize, Serialize};

/// Preferred value with an upper bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Value the device should aim for
    pub ideal: u32,
    /// Hard upper bound
    pub max: u32,
}

impl Range {
    /// Create a range
    pub const fn new(ideal: u32, max: u32) -> Self {
        Self { ideal, max }
    }
}

/// Which camera to prefer on devices with several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera
    User,
    /// Rear camera
    Environment,
}

/// Video capture constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConstraints {
    /// Frame width in pixels
    pub width: Range,
    /// Frame height in pixels
    pub height: Range,
    /// Frames per second
    pub frame_rate: Range,
    /// Preferred camera
    pub facing_mode: Option<FacingMode>,
}

impl VideoConstraints {
    /// Screens at or below these dimensions get the compact tier
    pub const COMPACT_SCREEN_WIDTH: u32 = 1400;
    /// See [`Self::COMPACT_SCREEN_WIDTH`]
    pub const COMPACT_SCREEN_HEIGHT: u32 = 800;

    /// Small tiles for 13-14 inch laptop screens
    pub fn compact() -> Self {
        Self {
            width: Range::new(240, 480),
            height: Range::new(180, 360),
            frame_rate: Range::new(15, 20),
            facing_mode: None,
        }
    }

    /// Tiles for larger screens
    pub fn standard() -> Self {
        Self {
            width: Range::new(320, 640),
            height: Range::new(240, 480),
            frame_rate: Range::new(20, 24),
            facing_mode: None,
        }
    }

    /// Pick a tier from the size of the window showing the mesh
    pub fn for_screen(width: u32, height: u32) -> Self {
        if width <= Self::COMPACT_SCREEN_WIDTH || height <= Self::COMPACT_SCREEN_HEIGHT {
            Self::compact()
        } else {
            Self::standard()
        }
    }
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: Range::new(640, 1280),
            height: Range::new(480, 720),
            frame_rate: Range::new(24, 30),
            facing_mode: Some(FacingMode::User),
        }
    }
}

/// Audio processing constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    /// Cancel speaker echo
    pub echo_cancellation: bool,
    /// Suppress background noise
    pub noise_suppression: bool,
    /// Normalise input level
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// What to capture; `None` means the kind is not requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Video constraints
    pub video: Option<VideoConstraints>,
    /// Audio constraints
    pub audio: Option<AudioConstraints>,
}

impl MediaConstraints {
    /// Camera and microphone
    pub fn audio_video(video: VideoConstraints) -> Self {
        Self {
            video: Some(video),
            audio: Some(AudioConstraints::default()),
        }
    }

    /// Whether a kind is requested
    pub fn requests(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Video => self.video.is_some(),
            TrackKind::Audio => self.audio.is_some(),
        }
    }

    /// Fallback ladder: both kinds, then video only, then audio only.
    ///
    /// Only rungs whose kinds were requested are produced.
    pub fn fallback_ladder(&self) -> Vec<MediaConstraints> {
        let mut ladder = Vec::new();
        if self.video.is_some() || self.audio.is_some() {
            ladder.push(self.clone());
        }
        if self.video.is_some() && self.audio.is_some() {
            ladder.push(MediaConstraints {
                video: self.video.clone(),
                audio: None,
            });
            ladder.push(MediaConstraints {
                video: None,
                audio: self.audio,
            });
        }
        ladder
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self::audio_video(VideoConstraints::default())
    }
}
