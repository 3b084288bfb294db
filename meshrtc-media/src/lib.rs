//! # Mesh RTC Media
//!
//! Local camera and microphone handling for mesh sessions: capture
//! constraints and resolution tiers, a device fallback ladder, and the
//! [`LocalMediaSource`] contract the orchestration core consumes.

#![warn(clippy::all)]

pub mod capture;
pub mod constraints;
pub mod error;
pub mod manager;
pub mod source;

// Re-export main types
pub use capture::{CaptureBackend, SimulatedCapture};
pub use constraints::{AudioConstraints, FacingMode, MediaConstraints, Range, VideoConstraints};
pub use error::{MediaError, MediaResult};
pub use manager::MediaManager;
pub use source::{LocalMediaSource, MediaHandle, MediaStatus};
