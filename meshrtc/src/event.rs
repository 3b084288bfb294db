//! Event system for peer and stream notifications

use meshrtc_core::{ParticipantId, RemoteStream};
use tokio::sync::mpsc;

/// Notifications produced by the mesh
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    /// A remote participant's media stream is ready to render
    RemoteStreamAvailable {
        /// Participant the stream belongs to
        peer_id: ParticipantId,
        /// The stream
        stream: RemoteStream,
    },
    /// A transport to a remote participant reached connectivity
    PeerConnected {
        /// Participant ID
        peer_id: ParticipantId,
    },
    /// A remote participant's transport was torn down after a failure
    PeerDisconnected {
        /// Participant ID
        peer_id: ParticipantId,
    },
}

impl MeshEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            MeshEvent::RemoteStreamAvailable { .. } => "remote_stream_available",
            MeshEvent::PeerConnected { .. } => "peer_connected",
            MeshEvent::PeerDisconnected { .. } => "peer_disconnected",
        }
    }

    /// Participant the event concerns
    pub fn peer_id(&self) -> &ParticipantId {
        match self {
            MeshEvent::RemoteStreamAvailable { peer_id, .. }
            | MeshEvent::PeerConnected { peer_id }
            | MeshEvent::PeerDisconnected { peer_id } => peer_id,
        }
    }

    /// Check if this is a connectivity event
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            MeshEvent::PeerConnected { .. } | MeshEvent::PeerDisconnected { .. }
        )
    }
}

/// Stream of mesh events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<MeshEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<MeshEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<MeshEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<MeshEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Drain every event already queued
    pub fn drain(&mut self) -> Vec<MeshEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_from(peer: &str) -> RemoteStream {
        RemoteStream {
            id: format!("{}-stream", peer),
            peer_id: peer.into(),
            track_ids: vec!["video".to_string(), "audio".to_string()],
        }
    }

    #[test]
    fn test_event_classification() {
        let available = MeshEvent::RemoteStreamAvailable {
            peer_id: "bob".into(),
            stream: stream_from("bob"),
        };
        assert_eq!(available.event_type(), "remote_stream_available");
        assert!(!available.is_connection_event());
        assert_eq!(available.peer_id(), &ParticipantId::from("bob"));

        let gone = MeshEvent::PeerDisconnected {
            peer_id: "carol".into(),
        };
        assert_eq!(gone.event_type(), "peer_disconnected");
        assert!(gone.is_connection_event());
    }

    #[tokio::test]
    async fn test_event_stream_basic() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = EventStream::new(rx);

        tx.send(MeshEvent::PeerConnected {
            peer_id: "bob".into(),
        })
        .unwrap();

        let received = events.next().await.unwrap();
        assert_eq!(received.event_type(), "peer_connected");
        assert!(events.try_next().unwrap().is_none());

        drop(tx);
        assert!(events.try_next().is_err());
    }
}
