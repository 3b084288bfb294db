//! Structured debug logging system

use meshrtc_core::MeshRtcError;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "meshrtc=info";

/// Installs the process-wide `tracing` subscriber
#[derive(Debug, Default)]
pub struct DebugLogger;

impl DebugLogger {
    /// Initialize logging from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
    ///
    /// Calling this more than once is harmless; only the first call installs
    /// a subscriber.
    pub fn init_logging() -> Result<(), MeshRtcError> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        Self::install(filter)
    }

    /// Initialize logging with an explicit filter directive
    pub fn init_logging_with(directives: &str) -> Result<(), MeshRtcError> {
        let filter =
            EnvFilter::try_new(directives).map_err(|e| MeshRtcError::Initialization {
                reason: format!("invalid log filter {:?}: {}", directives, e),
            })?;
        Self::install(filter)
    }

    fn install(filter: EnvFilter) -> Result<(), MeshRtcError> {
        if tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_err()
        {
            tracing::debug!("Logging already initialized");
        }
        Ok(())
    }
}
