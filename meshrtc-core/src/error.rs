//! Error types for mesh RTC

use std::time::Duration;
use thiserror::Error;

/// Main error type for mesh orchestration operations
#[derive(Error, Debug)]
pub enum MeshRtcError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// The peer transport primitive reported an error
    #[error("Transport error for peer {peer_id}: {reason}")]
    Transport {
        /// Remote participant the transport belongs to
        peer_id: String,
        /// Reason for transport error
        reason: String,
    },

    /// A handshake fragment was applied before the remote description existed
    #[error("Candidate for peer {peer_id} arrived before the remote description was set")]
    PrematureCandidate {
        /// Remote participant the fragment came from
        peer_id: String,
    },

    /// A per-peer state transition that the state machine does not allow
    #[error("Invalid transition for peer {peer_id}: {event} in state {state}")]
    InvalidTransition {
        /// Remote participant
        peer_id: String,
        /// State the link was in
        state: String,
        /// Event that was rejected
        event: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Attempted to open a link to ourselves
    #[error("Refusing to connect participant {participant_id} to itself")]
    SelfConnection {
        /// Local participant ID
        participant_id: String,
    },

    /// Handshake did not complete in time
    #[error("Handshake with {peer_id} timed out after {duration:?}")]
    HandshakeTimeout {
        /// Remote participant
        peer_id: String,
        /// Configured handshake window
        duration: Duration,
    },

    /// Publish attempted while the signaling channel is not subscribed
    #[error("Signaling channel not ready: state is {state}")]
    SignalingNotReady {
        /// Current channel state
        state: String,
    },

    /// Relay subscription failed
    #[error("Subscription to {topic} failed: {reason}")]
    SubscriptionFailed {
        /// Topic that could not be subscribed
        topic: String,
        /// Failure reason
        reason: String,
    },

    /// Relay publish failed
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed {
        /// Topic the event was published to
        topic: String,
        /// Failure reason
        reason: String,
    },

    /// Invalid message format
    #[error("Invalid message format: {message}, error: {source}")]
    InvalidMessage {
        /// Invalid message content
        message: String,
        /// Parsing error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Serialization of an outbound payload failed
    #[error("Serialization failed: {source}")]
    Serialization {
        /// Underlying serde error
        #[from]
        source: serde_json::Error,
    },

    /// Local media could not be provided
    #[error("Media error: {reason}")]
    Media {
        /// Reason for media error
        reason: String,
    },

    /// Participant already exists
    #[error("Participant {participant_id} already exists in room {room_id}")]
    ParticipantAlreadyExists {
        /// Room ID
        room_id: String,
        /// Participant ID that already exists
        participant_id: String,
    },

    /// Participant not found
    #[error("Participant {participant_id} not found in room {room_id}")]
    ParticipantNotFound {
        /// Room ID
        room_id: String,
        /// Participant ID that was not found
        participant_id: String,
    },

    /// Operation on a room that has already been left
    #[error("Room {room_id} is closed")]
    RoomClosed {
        /// Room ID
        room_id: String,
    },
}

impl MeshRtcError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            MeshRtcError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            MeshRtcError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
            MeshRtcError::Transport { .. } => "TRANSPORT_ERROR".to_string(),
            MeshRtcError::PrematureCandidate { .. } => "PREMATURE_CANDIDATE".to_string(),
            MeshRtcError::InvalidTransition { .. } => "INVALID_TRANSITION".to_string(),
            MeshRtcError::InvalidState { .. } => "INVALID_STATE".to_string(),
            MeshRtcError::SelfConnection { .. } => "SELF_CONNECTION".to_string(),
            MeshRtcError::HandshakeTimeout { .. } => "HANDSHAKE_TIMEOUT".to_string(),
            MeshRtcError::SignalingNotReady { .. } => "SIGNALING_NOT_READY".to_string(),
            MeshRtcError::SubscriptionFailed { .. } => "SUBSCRIPTION_FAILED".to_string(),
            MeshRtcError::PublishFailed { .. } => "PUBLISH_FAILED".to_string(),
            MeshRtcError::InvalidMessage { .. } => "INVALID_MESSAGE".to_string(),
            MeshRtcError::Serialization { .. } => "SERIALIZATION_FAILED".to_string(),
            MeshRtcError::Media { .. } => "MEDIA_ERROR".to_string(),
            MeshRtcError::ParticipantAlreadyExists { .. } => {
                "PARTICIPANT_ALREADY_EXISTS".to_string()
            }
            MeshRtcError::ParticipantNotFound { .. } => "PARTICIPANT_NOT_FOUND".to_string(),
            MeshRtcError::RoomClosed { .. } => "ROOM_CLOSED".to_string(),
        }
    }

    /// Whether the error only affects a single peer link
    pub fn is_peer_scoped(&self) -> bool {
        matches!(
            self,
            MeshRtcError::Transport { .. }
                | MeshRtcError::PrematureCandidate { .. }
                | MeshRtcError::InvalidTransition { .. }
                | MeshRtcError::HandshakeTimeout { .. }
        )
    }

    /// Shorthand for a transport failure on `peer_id`
    pub fn transport(peer_id: impl Into<String>, reason: impl Into<String>) -> Self {
        MeshRtcError::Transport {
            peer_id: peer_id.into(),
            reason: reason.into(),
        }
    }
}
