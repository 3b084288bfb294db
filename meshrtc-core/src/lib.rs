//! # Mesh RTC Core
//!
//! Foundational types for full-mesh real-time sessions: identities, the room
//! membership model, the contract for the external peer transport primitive,
//! and the per-peer link state machine driven by the orchestration layer.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod identity;
pub mod link;
pub mod room;
pub mod track;
pub mod transport;

// Re-export main types
pub use error::MeshRtcError;
pub use identity::{ParticipantId, RoomId};
pub use link::{LinkEvent, LinkState, LinkTransitionError, PeerLinkSnapshot};
pub use room::Room;
pub use track::{MediaTrack, TrackKind};
pub use transport::{
    HandshakeFragment, IceServer, PeerTransport, RemoteStream, SdpType, SessionDescription,
    TransportConfig, TransportEvent, TransportEventSender, TransportFactory, TransportState,
    DEFAULT_STUN_SERVERS,
};
