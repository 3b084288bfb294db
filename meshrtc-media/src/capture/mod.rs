pub mod simulated;

use crate::constraints::MediaConstraints;
use crate::error::MediaResult;
use async_trait::async_trait;
use meshrtc_core::MediaTrack;

pub use simulated::SimulatedCapture;

/// Device access backend used by the media manager.
///
/// One call opens every device the constraints request, or fails as a
/// whole; the manager takes care of falling back to fewer devices.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Open devices for the requested kinds
    async fn open(&self, constraints: &MediaConstraints) -> MediaResult<Vec<MediaTrack>>;
}
