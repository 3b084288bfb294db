//! Per-peer connection state machine

use crate::error::MeshRtcError;
use crate::identity::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the link to one remote participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Transport created, no handshake started
    Idle,
    /// Local offer sent, waiting for the answer and connectivity
    Offering,
    /// Remote offer received, answer sent, waiting for connectivity
    Answering,
    /// Media can flow
    Connected,
    /// Connectivity lost
    Disconnected,
    /// Handshake or connectivity failed
    Failed,
    /// Torn down; a new link is needed to reconnect
    Closed,
}

/// Inputs to the link state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// We started an offer
    LocalOffer,
    /// The remote side offered
    RemoteOffer,
    /// Transport reported connected
    Connected,
    /// Transport reported disconnected
    Disconnected,
    /// Transport reported failed, or a local handshake step failed
    Failed,
    /// Handshake window elapsed before connecting
    HandshakeTimeout,
    /// Link is being torn down
    Close,
}

impl LinkState {
    /// Apply an event, returning the next state
    pub fn on(self, event: LinkEvent) -> Result<LinkState, LinkTransitionError> {
        use LinkEvent as E;
        use LinkState as S;

        let next = match (self, event) {
            (_, E::Close) => S::Closed,
            (S::Closed, _) => return Err(LinkTransitionError { state: self, event }),
            (S::Idle, E::LocalOffer) => S::Offering,
            (S::Idle, E::RemoteOffer) => S::Answering,
            // Offer collision where the local side yields
            (S::Offering, E::RemoteOffer) => S::Answering,
            (S::Offering | S::Answering | S::Connected, E::Connected) => S::Connected,
            (_, E::Disconnected) => S::Disconnected,
            (_, E::Failed | E::HandshakeTimeout) => S::Failed,
            _ => return Err(LinkTransitionError { state: self, event }),
        };
        Ok(next)
    }

    /// Whether the handshake is still in flight
    pub fn is_handshaking(self) -> bool {
        matches!(self, LinkState::Offering | LinkState::Answering)
    }

    /// Whether the link can no longer carry media
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LinkState::Disconnected | LinkState::Failed | LinkState::Closed
        )
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::Offering => "offering",
            LinkState::Answering => "answering",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
            LinkState::Failed => "failed",
            LinkState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Rejected transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTransitionError {
    /// State the link was in
    pub state: LinkState,
    /// Event that was not accepted
    pub event: LinkEvent,
}

impl LinkTransitionError {
    /// Attach the peer the rejected transition belongs to
    pub fn for_peer(self, peer_id: &ParticipantId) -> MeshRtcError {
        MeshRtcError::InvalidTransition {
            peer_id: peer_id.to_string(),
            state: self.state.to_string(),
            event: format!("{:?}", self.event),
        }
    }
}

/// Point-in-time view of one link, for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerLinkSnapshot {
    /// Remote participant
    pub peer_id: ParticipantId,
    /// Link generation
    pub link_id: uuid::Uuid,
    /// Current state
    pub state: LinkState,
    /// Whether an outbound offer is in flight
    pub connecting: bool,
    /// When the link was created
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Inbound candidates waiting for a remote description
    pub pending_candidates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use LinkEvent as E;
    use LinkState as S;

    #[test]
    fn test_offer_path() {
        let state = S::Idle.on(E::LocalOffer).unwrap();
        assert_eq!(state, S::Offering);
        assert!(state.is_handshaking());
        let state = state.on(E::Connected).unwrap();
        assert_eq!(state, S::Connected);
        assert!(!state.is_handshaking());
    }

    #[test]
    fn test_answer_path() {
        let state = S::Idle.on(E::RemoteOffer).unwrap();
        assert_eq!(state, S::Answering);
        assert_eq!(state.on(E::Connected).unwrap(), S::Connected);
    }

    #[test]
    fn test_glare_yield() {
        assert_eq!(S::Offering.on(E::RemoteOffer).unwrap(), S::Answering);
    }

    #[test]
    fn test_failure_from_any_live_state() {
        for state in [S::Idle, S::Offering, S::Answering, S::Connected, S::Disconnected] {
            assert_eq!(state.on(E::Failed).unwrap(), S::Failed);
            assert_eq!(state.on(E::HandshakeTimeout).unwrap(), S::Failed);
            assert_eq!(state.on(E::Disconnected).unwrap(), S::Disconnected);
            assert_eq!(state.on(E::Close).unwrap(), S::Closed);
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        assert!(S::Closed.is_terminal());
        assert_eq!(S::Closed.on(E::Close).unwrap(), S::Closed);
        for event in [
            E::LocalOffer,
            E::RemoteOffer,
            E::Connected,
            E::Disconnected,
            E::Failed,
            E::HandshakeTimeout,
        ] {
            assert!(S::Closed.on(event).is_err());
        }
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(S::Connected.on(E::LocalOffer).is_err());
        assert!(S::Connected.on(E::RemoteOffer).is_err());
        assert!(S::Answering.on(E::LocalOffer).is_err());
        assert!(S::Idle.on(E::Connected).is_err());

        let err = S::Answering
            .on(E::LocalOffer)
            .unwrap_err()
            .for_peer(&ParticipantId::from("bob"));
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert!(err.to_string().contains("answering"));
    }
}
