//! # Mesh RTC Diagnostics
//!
//! Debugging and diagnostic tools for mesh sessions.
//! Provides structured logging setup and link health summaries.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod connection_analyzer;
pub mod debug_logger;

// Re-export main types
pub use connection_analyzer::{LinkHealth, MeshHealth, DEFAULT_STALL_THRESHOLD};
pub use debug_logger::DebugLogger;
