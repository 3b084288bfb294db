//! Contract for the peer transport primitive
//!
//! The transport itself (ICE, DTLS, SRTP, codec negotiation) lives outside
//! this workspace. Orchestration only drives it through [`PeerTransport`] and
//! listens to the [`TransportEvent`]s it emits.

use crate::error::MeshRtcError;
use crate::identity::ParticipantId;
use crate::track::MediaTrack;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default public STUN servers
pub const DEFAULT_STUN_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// ICE server entry handed to the transport primitive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs
    pub urls: Vec<String>,
    /// Optional TURN username
    pub username: Option<String>,
    /// Optional TURN credential
    pub credential: Option<String>,
}

impl IceServer {
    /// STUN server without credentials
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Configuration passed to every transport the factory creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// ICE servers
    pub ice_servers: Vec<IceServer>,
    /// Number of candidates to pre-gather
    pub ice_candidate_pool_size: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_STUN_SERVERS
                .iter()
                .map(|url| IceServer::stun(*url))
                .collect(),
            ice_candidate_pool_size: 10,
        }
    }
}

/// Which side of the handshake a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Description produced by the initiator
    Offer,
    /// Description produced in response to an offer
    Answer,
}

/// Session description exchanged through signaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Opaque SDP blob
    pub sdp: String,
}

impl SessionDescription {
    /// Offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One unit of connectivity information (an ICE candidate)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeFragment {
    /// Candidate line
    pub candidate: String,
    /// Media stream identification tag
    pub sdp_mid: Option<String>,
    /// Media line index
    pub sdp_m_line_index: Option<u16>,
}

impl HandshakeFragment {
    /// Fragment with only a candidate line
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// Connection state reported by the transport primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Created, nothing negotiated
    New,
    /// Connectivity checks in progress
    Connecting,
    /// Media can flow
    Connected,
    /// Connectivity lost, may be transient
    Disconnected,
    /// Connectivity checks failed
    Failed,
    /// Transport closed
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Media stream received from a remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    /// Stream ID assigned by the remote side
    pub id: String,
    /// Participant the stream belongs to
    pub peer_id: ParticipantId,
    /// Track IDs carried by the stream
    pub track_ids: Vec<String>,
}

/// Events emitted by a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local candidate was gathered and should be signaled
    Candidate(HandshakeFragment),
    /// A remote track arrived as part of a stream
    Track(RemoteStream),
    /// The connection state changed
    StateChanged(TransportState),
}

/// Sender half handed to the transport for its events
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// The peer transport primitive, one instance per remote participant
#[async_trait]
pub trait PeerTransport: Send + Sync + fmt::Debug {
    /// Generate an offer
    async fn create_offer(&self) -> Result<SessionDescription, MeshRtcError>;

    /// Generate an answer to the applied remote offer
    async fn create_answer(&self) -> Result<SessionDescription, MeshRtcError>;

    /// Apply a locally generated description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MeshRtcError>;

    /// Apply the remote side's description
    async fn set_remote_description(&self, desc: SessionDescription)
        -> Result<(), MeshRtcError>;

    /// Whether a remote description has been applied
    fn has_remote_description(&self) -> bool;

    /// Apply a remote candidate.
    ///
    /// Fails with [`MeshRtcError::PrematureCandidate`] when no remote
    /// description exists yet.
    async fn add_candidate(&self, fragment: HandshakeFragment) -> Result<(), MeshRtcError>;

    /// Attach a local track for sending
    fn add_track(&self, track: &MediaTrack) -> Result<(), MeshRtcError>;

    /// Close the transport and release its resources
    fn close(&self);
}

/// Creates transports for the orchestration core
pub trait TransportFactory: Send + Sync {
    /// Create a transport toward `peer_id` that reports through `events`
    fn create(
        &self,
        peer_id: &ParticipantId,
        config: &TransportConfig,
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>, MeshRtcError>;
}
