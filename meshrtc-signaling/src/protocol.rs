//! Signaling protocol messages

use meshrtc_core::{HandshakeFragment, MeshRtcError, ParticipantId, SessionDescription};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Kind of handshake message carried over the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Session offer
    Offer,
    /// Session answer
    Answer,
    /// Connectivity candidate
    Candidate,
}

impl SignalKind {
    /// Relay event name used when publishing this kind
    pub fn event_name(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "ice-candidate",
        }
    }

    /// Map a relay event name back to a kind
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "ice-candidate" => Some(SignalKind::Candidate),
            _ => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Event as seen by the broadcast relay: a name and an opaque payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    /// Event name
    pub event: String,
    /// Event payload
    pub payload: serde_json::Value,
}

/// Addressed handshake message.
///
/// Every participant in a room sees every message on the room topic, so
/// receivers drop anything whose `target` is not their own identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingMessage {
    /// Message kind
    pub kind: SignalKind,
    /// Sender identity
    pub from: ParticipantId,
    /// Intended recipient
    pub target: ParticipantId,
    /// Kind-specific body
    pub body: serde_json::Value,
}

impl SignalingMessage {
    fn build(
        kind: SignalKind,
        from: &ParticipantId,
        target: &ParticipantId,
        body: &impl Serialize,
    ) -> Result<Self, MeshRtcError> {
        Ok(Self {
            kind,
            from: from.clone(),
            target: target.clone(),
            body: serde_json::to_value(body)?,
        })
    }

    /// Offer carrying a session description
    pub fn offer(
        from: &ParticipantId,
        target: &ParticipantId,
        desc: &SessionDescription,
    ) -> Result<Self, MeshRtcError> {
        Self::build(SignalKind::Offer, from, target, desc)
    }

    /// Answer carrying a session description
    pub fn answer(
        from: &ParticipantId,
        target: &ParticipantId,
        desc: &SessionDescription,
    ) -> Result<Self, MeshRtcError> {
        Self::build(SignalKind::Answer, from, target, desc)
    }

    /// Candidate carrying one handshake fragment
    pub fn candidate(
        from: &ParticipantId,
        target: &ParticipantId,
        fragment: &HandshakeFragment,
    ) -> Result<Self, MeshRtcError> {
        Self::build(SignalKind::Candidate, from, target, fragment)
    }

    /// Whether this message is addressed to `local`
    pub fn is_for(&self, local: &ParticipantId) -> bool {
        &self.target == local
    }

    /// Decode the body of an offer or answer
    pub fn description(&self) -> Result<SessionDescription, MeshRtcError> {
        self.decode_body()
    }

    /// Decode the body of a candidate
    pub fn fragment(&self) -> Result<HandshakeFragment, MeshRtcError> {
        self.decode_body()
    }

    fn decode_body<T: DeserializeOwned>(&self) -> Result<T, MeshRtcError> {
        serde_json::from_value(self.body.clone()).map_err(|e| MeshRtcError::InvalidMessage {
            message: format!("{} body from {}", self.kind, self.from),
            source: Box::new(e),
        })
    }

    /// Wrap for the relay
    pub fn to_event(&self) -> Result<BroadcastEvent, MeshRtcError> {
        Ok(BroadcastEvent {
            event: self.kind.event_name().to_string(),
            payload: serde_json::to_value(self)?,
        })
    }

    /// Unwrap a relay event; unknown names and malformed payloads are errors
    pub fn from_event(event: &BroadcastEvent) -> Result<Self, MeshRtcError> {
        let expected = SignalKind::from_event_name(&event.event).ok_or_else(|| {
            MeshRtcError::InvalidMessage {
                message: event.event.clone(),
                source: "unknown event name".into(),
            }
        })?;

        let message: SignalingMessage =
            serde_json::from_value(event.payload.clone()).map_err(|e| {
                MeshRtcError::InvalidMessage {
                    message: event.payload.to_string(),
                    source: Box::new(e),
                }
            })?;

        if message.kind != expected {
            return Err(MeshRtcError::InvalidMessage {
                message: event.event.clone(),
                source: format!("payload kind is {}", message.kind).into(),
            });
        }

        Ok(message)
    }
}
