//! Topic-scoped broadcast relay
//!
//! The mesh never talks to peers directly while negotiating; every handshake
//! message goes through a publish/subscribe relay keyed by topic. This module
//! defines that contract and an in-process implementation.

use crate::protocol::BroadcastEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use meshrtc_core::MeshRtcError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Stream of events delivered on a subscribed topic
pub type Subscription = mpsc::UnboundedReceiver<BroadcastEvent>;

/// A publish/subscribe relay. Senders do not receive their own events.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Subscribe to a topic; returning is the relay's acknowledgement
    async fn subscribe(&self, topic: &str) -> Result<Subscription, MeshRtcError>;

    /// Publish an event to every other subscriber of a topic
    async fn publish(&self, topic: &str, event: BroadcastEvent) -> Result<(), MeshRtcError>;

    /// Drop this client's subscription to a topic
    async fn unsubscribe(&self, topic: &str) -> Result<(), MeshRtcError>;
}

#[derive(Debug)]
struct Subscriber {
    client_id: Uuid,
    sender: mpsc::UnboundedSender<BroadcastEvent>,
}

/// Published events a [`MemoryRelay`] remembers by default
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

#[derive(Debug)]
struct RelayHub {
    topics: DashMap<String, Vec<Subscriber>>,
    history: Mutex<VecDeque<(String, BroadcastEvent)>>,
    history_limit: usize,
    redeliver: AtomicBool,
    reject_subscribe: AtomicBool,
    reject_publish: AtomicBool,
}

/// In-process relay hub.
///
/// Each participant gets its own [`RelayClient`] from [`MemoryRelay::client`].
/// The hub can be told to deliver every event twice, to exercise
/// at-least-once delivery, or to reject operations. It keeps the most recent
/// published events for inspection, up to a fixed limit.
#[derive(Debug, Clone)]
pub struct MemoryRelay {
    hub: Arc<RelayHub>,
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl MemoryRelay {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty hub remembering at most `limit` published events
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            hub: Arc::new(RelayHub {
                topics: DashMap::new(),
                history: Mutex::new(VecDeque::new()),
                history_limit: limit,
                redeliver: AtomicBool::new(false),
                reject_subscribe: AtomicBool::new(false),
                reject_publish: AtomicBool::new(false),
            }),
        }
    }

    /// New client connection to this hub
    pub fn client(&self) -> RelayClient {
        RelayClient {
            id: Uuid::new_v4(),
            hub: self.hub.clone(),
        }
    }

    /// Deliver every published event twice
    pub fn set_redelivery(&self, enabled: bool) {
        self.hub.redeliver.store(enabled, Ordering::SeqCst);
    }

    /// Make subsequent subscriptions fail
    pub fn set_reject_subscribe(&self, reject: bool) {
        self.hub.reject_subscribe.store(reject, Ordering::SeqCst);
    }

    /// Make subsequent publishes fail
    pub fn set_reject_publish(&self, reject: bool) {
        self.hub.reject_publish.store(reject, Ordering::SeqCst);
    }

    /// Number of live subscribers on a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.hub
            .topics
            .get(topic)
            .map(|subs| subs.iter().filter(|s| !s.sender.is_closed()).count())
            .unwrap_or(0)
    }

    /// Recent events published on a topic, in publish order
    pub fn published(&self, topic: &str) -> Vec<BroadcastEvent> {
        self.hub
            .history
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Number of events with a given name published on a topic
    pub fn published_count(&self, topic: &str, event: &str) -> usize {
        self.published(topic)
            .iter()
            .filter(|e| e.event == event)
            .count()
    }
}

/// One participant's connection to a [`MemoryRelay`]
#[derive(Debug, Clone)]
pub struct RelayClient {
    id: Uuid,
    hub: Arc<RelayHub>,
}

impl RelayClient {
    /// Client identifier
    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[async_trait]
impl BroadcastChannel for RelayClient {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, MeshRtcError> {
        if self.hub.reject_subscribe.load(Ordering::SeqCst) {
            return Err(MeshRtcError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: "relay rejected subscription".to_string(),
            });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        self.hub
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                client_id: self.id,
                sender,
            });
        debug!(client = %self.id, topic, "Subscribed");
        Ok(receiver)
    }

    async fn publish(&self, topic: &str, event: BroadcastEvent) -> Result<(), MeshRtcError> {
        if self.hub.reject_publish.load(Ordering::SeqCst) {
            return Err(MeshRtcError::PublishFailed {
                topic: topic.to_string(),
                reason: "relay rejected publish".to_string(),
            });
        }

        let copies = if self.hub.redeliver.load(Ordering::SeqCst) {
            2
        } else {
            1
        };

        if let Some(mut subscribers) = self.hub.topics.get_mut(topic) {
            subscribers.retain(|s| !s.sender.is_closed());
            for subscriber in subscribers.iter().filter(|s| s.client_id != self.id) {
                for _ in 0..copies {
                    // A receiver dropped since the retain is pruned next time
                    let _ = subscriber.sender.send(event.clone());
                }
            }
        }

        trace!(client = %self.id, topic, event = %event.event, "Published");
        if self.hub.history_limit > 0 {
            let mut history = self.hub.history.lock();
            if history.len() >= self.hub.history_limit {
                history.pop_front();
            }
            history.push_back((topic.to_string(), event));
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), MeshRtcError> {
        if let Some(mut subscribers) = self.hub.topics.get_mut(topic) {
            subscribers.retain(|s| s.client_id != self.id);
        }
        debug!(client = %self.id, topic, "Unsubscribed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str) -> BroadcastEvent {
        BroadcastEvent {
            event: name.to_string(),
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn test_sender_does_not_hear_itself() {
        let relay = MemoryRelay::new();
        let a = relay.client();
        let b = relay.client();

        let mut a_rx = a.subscribe("webrtc-room").await.unwrap();
        let mut b_rx = b.subscribe("webrtc-room").await.unwrap();

        a.publish("webrtc-room", event("offer")).await.unwrap();

        assert_eq!(b_rx.recv().await.unwrap().event, "offer");
        assert!(a_rx.try_recv().is_err());
        assert_eq!(relay.published_count("webrtc-room", "offer"), 1);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let relay = MemoryRelay::new();
        let a = relay.client();
        let b = relay.client();

        let mut b_rx = b.subscribe("webrtc-other").await.unwrap();
        a.publish("webrtc-room", event("offer")).await.unwrap();
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_redelivery() {
        let relay = MemoryRelay::new();
        relay.set_redelivery(true);
        let a = relay.client();
        let b = relay.client();

        let mut b_rx = b.subscribe("t").await.unwrap();
        a.publish("t", event("answer")).await.unwrap();

        assert_eq!(b_rx.recv().await.unwrap().event, "answer");
        assert_eq!(b_rx.recv().await.unwrap().event, "answer");
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_stream() {
        let relay = MemoryRelay::new();
        let a = relay.client();
        let mut rx = a.subscribe("t").await.unwrap();
        assert_eq!(relay.subscriber_count("t"), 1);

        a.unsubscribe("t").await.unwrap();
        assert_eq!(relay.subscriber_count("t"), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let relay = MemoryRelay::with_history_limit(2);
        let a = relay.client();

        for name in ["offer", "answer", "ice-candidate"] {
            a.publish("t", event(name)).await.unwrap();
        }

        let names: Vec<_> = relay.published("t").into_iter().map(|e| e.event).collect();
        assert_eq!(names, vec!["answer", "ice-candidate"]);
    }

    #[tokio::test]
    async fn test_rejections() {
        let relay = MemoryRelay::new();
        let a = relay.client();

        relay.set_reject_subscribe(true);
        let err = tokio_test::assert_err!(a.subscribe("t").await);
        assert_eq!(err.error_code(), "SUBSCRIPTION_FAILED");

        relay.set_reject_publish(true);
        let err = tokio_test::assert_err!(a.publish("t", event("offer")).await);
        assert_eq!(err.error_code(), "PUBLISH_FAILED");
        assert!(relay.published("t").is_empty());
    }
}
