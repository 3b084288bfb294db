//! Configuration types and defaults

use crate::mesh::InitiatorPolicy;
use meshrtc_core::TransportConfig;
use meshrtc_signaling::{DEFAULT_BATCH_WINDOW, DEFAULT_TOPIC_PREFIX};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time allowed for an offer/answer exchange to reach connectivity
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Per-room mesh configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// How long outgoing candidates for a peer are collected before publishing
    pub candidate_batch_window: Duration,
    /// Handshake deadline; `None` disables the timeout
    pub handshake_timeout: Option<Duration>,
    /// Which side of a pair sends the offer
    pub initiator_policy: InitiatorPolicy,
    /// Relay topic prefix; the room topic is `"{prefix}-{room}"`
    pub topic_prefix: String,
    /// Settings passed to every transport
    pub transport: TransportConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            candidate_batch_window: DEFAULT_BATCH_WINDOW,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            initiator_policy: InitiatorPolicy::default(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            transport: TransportConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.candidate_batch_window, Duration::from_millis(100));
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.initiator_policy, InitiatorPolicy::Joiner);
        assert_eq!(config.topic_prefix, "webrtc");
        assert_eq!(config.transport.ice_servers.len(), 2);
        assert_eq!(config.transport.ice_candidate_pool_size, 10);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: MeshConfig =
            serde_json::from_str(r#"{ "topic_prefix": "game", "handshake_timeout": null }"#)
                .unwrap();
        assert_eq!(config.topic_prefix, "game");
        assert_eq!(config.handshake_timeout, None);
        assert_eq!(config.candidate_batch_window, DEFAULT_BATCH_WINDOW);
    }
}
