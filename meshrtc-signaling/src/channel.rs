//! Room-scoped signaling channel

use crate::protocol::{SignalKind, SignalingMessage};
use crate::relay::{BroadcastChannel, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meshrtc_core::{HandshakeFragment, MeshRtcError, ParticipantId, RoomId, SessionDescription};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Default topic prefix; the room topic is `"{prefix}-{room}"`
pub const DEFAULT_TOPIC_PREFIX: &str = "webrtc";

/// Receives handshake messages addressed to the local participant
#[async_trait]
pub trait SignalHandler: Send + Sync {
    /// A remote participant offered a session
    async fn handle_offer(
        &self,
        from: ParticipantId,
        desc: SessionDescription,
    ) -> Result<(), MeshRtcError>;

    /// A remote participant answered our offer
    async fn handle_answer(
        &self,
        from: ParticipantId,
        desc: SessionDescription,
    ) -> Result<(), MeshRtcError>;

    /// A remote participant sent a connectivity candidate
    async fn handle_candidate(
        &self,
        from: ParticipantId,
        fragment: HandshakeFragment,
    ) -> Result<(), MeshRtcError>;
}

/// Subscription state of a [`SignalingChannel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Not subscribed
    Disconnected,
    /// Waiting for the relay to acknowledge
    Subscribing,
    /// Ready to publish and receive
    Subscribed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Subscribing => "subscribing",
            ChannelState::Subscribed => "subscribed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Session {
    topic: String,
    local: ParticipantId,
    connected_at: DateTime<Utc>,
    receiver: JoinHandle<()>,
}

/// Connection details of a subscribed channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Relay topic
    pub topic: String,
    /// Local identity messages are filtered by
    pub local: ParticipantId,
    /// Time the relay acknowledged the subscription
    pub connected_at: DateTime<Utc>,
}

/// Carries offer, answer and candidate messages for one room over a
/// [`BroadcastChannel`].
///
/// Inbound events are parsed, filtered by target and handed to a
/// [`SignalHandler`] one at a time in delivery order. Publishing is only
/// allowed once the relay has acknowledged the subscription.
pub struct SignalingChannel {
    relay: Arc<dyn BroadcastChannel>,
    topic_prefix: String,
    state: RwLock<ChannelState>,
    session: Mutex<Option<Session>>,
}

impl SignalingChannel {
    /// Channel using the default topic prefix
    pub fn new(relay: Arc<dyn BroadcastChannel>) -> Self {
        Self::with_topic_prefix(relay, DEFAULT_TOPIC_PREFIX)
    }

    /// Channel using a custom topic prefix
    pub fn with_topic_prefix(relay: Arc<dyn BroadcastChannel>, prefix: impl Into<String>) -> Self {
        Self {
            relay,
            topic_prefix: prefix.into(),
            state: RwLock::new(ChannelState::Disconnected),
            session: Mutex::new(None),
        }
    }

    /// Topic name for a room
    pub fn topic_for(&self, room: &RoomId) -> String {
        format!("{}-{}", self.topic_prefix, room)
    }

    /// Current subscription state
    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    /// Details of the active subscription
    pub fn info(&self) -> Option<ChannelInfo> {
        self.session.lock().as_ref().map(|s| ChannelInfo {
            topic: s.topic.clone(),
            local: s.local.clone(),
            connected_at: s.connected_at,
        })
    }

    /// Subscribe to the room topic and start dispatching to `handler`
    pub async fn connect(
        &self,
        room: &RoomId,
        local: ParticipantId,
        handler: Weak<dyn SignalHandler>,
    ) -> Result<(), MeshRtcError> {
        {
            let mut state = self.state.write();
            if *state != ChannelState::Disconnected {
                return Err(MeshRtcError::InvalidState {
                    expected: ChannelState::Disconnected.to_string(),
                    actual: state.to_string(),
                });
            }
            *state = ChannelState::Subscribing;
        }

        let topic = self.topic_for(room);
        debug!(%topic, %local, "Subscribing to signaling topic");

        let events = match self.relay.subscribe(&topic).await {
            Ok(events) => events,
            Err(e) => {
                *self.state.write() = ChannelState::Disconnected;
                warn!(%topic, "Signaling subscription failed: {}", e);
                return Err(e);
            }
        };

        let acknowledged = {
            let mut state = self.state.write();
            let still_wanted = *state == ChannelState::Subscribing;
            if still_wanted {
                *state = ChannelState::Subscribed;
            }
            still_wanted
        };
        if !acknowledged {
            // Disconnected while waiting for the acknowledgement
            let _ = self.relay.unsubscribe(&topic).await;
            return Err(MeshRtcError::SignalingNotReady {
                state: ChannelState::Disconnected.to_string(),
            });
        }

        let receiver = tokio::spawn(receive_loop(events, local.clone(), handler));
        *self.session.lock() = Some(Session {
            topic: topic.clone(),
            local: local.clone(),
            connected_at: Utc::now(),
            receiver,
        });

        info!(%topic, %local, "Signaling channel subscribed");
        Ok(())
    }

    /// Publish a message to the room topic
    pub async fn publish(&self, message: &SignalingMessage) -> Result<(), MeshRtcError> {
        let state = self.state();
        if state != ChannelState::Subscribed {
            return Err(MeshRtcError::SignalingNotReady {
                state: state.to_string(),
            });
        }

        let topic = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.topic.clone())
            .ok_or_else(|| MeshRtcError::SignalingNotReady {
                state: ChannelState::Disconnected.to_string(),
            })?;

        let event = message.to_event()?;
        debug!(
            %topic,
            kind = %message.kind,
            target = %message.target,
            "Publishing signaling message"
        );
        self.relay.publish(&topic, event).await
    }

    /// Stop receiving and unsubscribe. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        *self.state.write() = ChannelState::Disconnected;
        let Some(session) = self.session.lock().take() else {
            return;
        };

        session.receiver.abort();
        if let Err(e) = self.relay.unsubscribe(&session.topic).await {
            warn!(topic = %session.topic, "Unsubscribe failed: {}", e);
        }
        info!(topic = %session.topic, "Signaling channel disconnected");
    }
}

impl fmt::Debug for SignalingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingChannel")
            .field("topic_prefix", &self.topic_prefix)
            .field("state", &self.state())
            .field("info", &self.info())
            .finish()
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.receiver.abort();
        }
    }
}

async fn receive_loop(
    mut events: Subscription,
    local: ParticipantId,
    handler: Weak<dyn SignalHandler>,
) {
    while let Some(event) = events.recv().await {
        let message = match SignalingMessage::from_event(&event) {
            Ok(message) => message,
            Err(e) => {
                warn!(event = %event.event, "Dropping malformed signaling event: {}", e);
                continue;
            }
        };

        if !message.is_for(&local) {
            trace!(target = %message.target, "Ignoring message for another participant");
            continue;
        }

        let Some(handler) = handler.upgrade() else {
            debug!(%local, "Signal handler gone, stopping receive loop");
            break;
        };

        let kind = message.kind;
        let from = message.from.clone();
        if let Err(e) = dispatch(handler.as_ref(), message).await {
            warn!(peer = %from, %kind, "Signaling message not handled: {}", e);
        }
    }
}

async fn dispatch(
    handler: &dyn SignalHandler,
    message: SignalingMessage,
) -> Result<(), MeshRtcError> {
    match message.kind {
        SignalKind::Offer => {
            let desc = message.description()?;
            handler.handle_offer(message.from, desc).await
        }
        SignalKind::Answer => {
            let desc = message.description()?;
            handler.handle_answer(message.from, desc).await
        }
        SignalKind::Candidate => {
            let fragment = message.fragment()?;
            handler.handle_candidate(message.from, fragment).await
        }
    }
}
