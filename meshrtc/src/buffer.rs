//! Inbound candidate buffering
//!
//! Candidates from a remote participant can arrive before its offer or
//! answer has been applied, and sometimes before a link to that participant
//! exists at all. They are held here, per participant, until the transport
//! can accept them.
//!
//! Each participant's queue is bounded. Once full, the oldest candidate is
//! dropped, so a stream of late copies for a link that no longer exists
//! cannot grow without limit.

use meshrtc_core::{HandshakeFragment, MeshRtcError, ParticipantId, PeerTransport};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Candidates held per participant before the oldest are dropped
pub const DEFAULT_PENDING_LIMIT: usize = 64;

/// Per-participant queues of candidates awaiting a remote description
#[derive(Debug)]
pub struct CandidateBuffer {
    queues: Mutex<HashMap<ParticipantId, VecDeque<HandshakeFragment>>>,
    limit: usize,
}

impl Default for CandidateBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_PENDING_LIMIT)
    }
}

impl CandidateBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer holding at most `limit` candidates per peer
    pub fn with_limit(limit: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            limit: limit.max(1),
        }
    }

    /// Hold a candidate for `peer`. Never fails; a full queue drops its oldest entry.
    pub fn enqueue(&self, peer: &ParticipantId, fragment: HandshakeFragment) {
        let mut queues = self.queues.lock();
        let queue = queues.entry(peer.clone()).or_default();
        if queue.len() >= self.limit {
            queue.pop_front();
            warn!(%peer, limit = self.limit, "Candidate buffer full, dropped oldest");
        }
        queue.push_back(fragment);
        debug!(%peer, pending = queue.len(), "Candidate buffered");
    }

    /// Apply every held candidate for `peer` in arrival order.
    ///
    /// Returns how many were applied. A candidate the transport rejects as
    /// premature goes back to the front of the queue together with every
    /// candidate after it; any other rejection drops that candidate.
    pub async fn flush(&self, peer: &ParticipantId, transport: &dyn PeerTransport) -> usize {
        let mut drained = match self.queues.lock().remove(peer) {
            Some(queue) if !queue.is_empty() => queue,
            _ => return 0,
        };

        let total = drained.len();
        let mut applied = 0;
        while let Some(fragment) = drained.pop_front() {
            match transport.add_candidate(fragment.clone()).await {
                Ok(()) => applied += 1,
                Err(MeshRtcError::PrematureCandidate { .. }) => {
                    drained.push_front(fragment);
                    self.requeue_front(peer, drained);
                    break;
                }
                Err(e) => warn!(%peer, "Dropping rejected candidate: {}", e),
            }
        }

        debug!(%peer, applied, total, "Candidate buffer flushed");
        applied
    }

    fn requeue_front(&self, peer: &ParticipantId, mut held: VecDeque<HandshakeFragment>) {
        let mut queues = self.queues.lock();
        let queue = queues.entry(peer.clone()).or_default();
        // Anything enqueued during the flush arrived later
        held.extend(queue.drain(..));
        *queue = held;
    }

    /// Drop every candidate held for `peer`, returning how many were dropped
    pub fn discard(&self, peer: &ParticipantId) -> usize {
        self.queues
            .lock()
            .remove(peer)
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    /// Drop everything
    pub fn clear(&self) {
        self.queues.lock().clear();
    }

    /// Number of candidates held for `peer`
    pub fn pending(&self, peer: &ParticipantId) -> usize {
        self.queues
            .lock()
            .get(peer)
            .map(|queue| queue.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meshrtc_core::{MediaTrack, SessionDescription};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    struct Recorder {
        ready: AtomicBool,
        applied: Mutex<Vec<String>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl PeerTransport for Recorder {
        async fn create_offer(&self) -> Result<SessionDescription, MeshRtcError> {
            Ok(SessionDescription::offer("o"))
        }

        async fn create_answer(&self) -> Result<SessionDescription, MeshRtcError> {
            Ok(SessionDescription::answer("a"))
        }

        async fn set_local_description(&self, _: SessionDescription) -> Result<(), MeshRtcError> {
            Ok(())
        }

        async fn set_remote_description(&self, _: SessionDescription) -> Result<(), MeshRtcError> {
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn has_remote_description(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn add_candidate(&self, fragment: HandshakeFragment) -> Result<(), MeshRtcError> {
            if !self.has_remote_description() {
                return Err(MeshRtcError::PrematureCandidate {
                    peer_id: "bob".to_string(),
                });
            }
            if self.reject.as_deref() == Some(fragment.candidate.as_str()) {
                return Err(MeshRtcError::transport("bob", "malformed candidate"));
            }
            self.applied.lock().push(fragment.candidate);
            Ok(())
        }

        fn add_track(&self, _: &MediaTrack) -> Result<(), MeshRtcError> {
            Ok(())
        }

        fn close(&self) {}
    }

    fn bob() -> ParticipantId {
        "bob".into()
    }

    #[tokio::test]
    async fn test_flush_in_arrival_order() {
        let buffer = CandidateBuffer::new();
        for c in ["c1", "c2", "c3"] {
            buffer.enqueue(&bob(), HandshakeFragment::new(c));
        }

        let transport = Recorder::default();
        transport.ready.store(true, Ordering::SeqCst);

        assert_eq!(buffer.flush(&bob(), &transport).await, 3);
        assert_eq!(*transport.applied.lock(), vec!["c1", "c2", "c3"]);
        assert_eq!(buffer.pending(&bob()), 0);
    }

    #[tokio::test]
    async fn test_premature_candidates_stay_queued() {
        let buffer = CandidateBuffer::new();
        buffer.enqueue(&bob(), HandshakeFragment::new("c1"));
        buffer.enqueue(&bob(), HandshakeFragment::new("c2"));

        let transport = Recorder::default();
        assert_eq!(buffer.flush(&bob(), &transport).await, 0);
        assert_eq!(buffer.pending(&bob()), 2);

        buffer.enqueue(&bob(), HandshakeFragment::new("c3"));
        transport.ready.store(true, Ordering::SeqCst);
        assert_eq!(buffer.flush(&bob(), &transport).await, 3);
        assert_eq!(*transport.applied.lock(), vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_rejected_candidate_is_dropped() {
        let buffer = CandidateBuffer::new();
        for c in ["c1", "bad", "c3"] {
            buffer.enqueue(&bob(), HandshakeFragment::new(c));
        }

        let transport = Recorder {
            reject: Some("bad".to_string()),
            ..Default::default()
        };
        transport.ready.store(true, Ordering::SeqCst);

        assert_eq!(buffer.flush(&bob(), &transport).await, 2);
        assert_eq!(*transport.applied.lock(), vec!["c1", "c3"]);
        assert_eq!(buffer.pending(&bob()), 0);
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let buffer = CandidateBuffer::with_limit(2);
        for c in ["stale-1", "stale-2", "c3"] {
            buffer.enqueue(&bob(), HandshakeFragment::new(c));
        }
        assert_eq!(buffer.pending(&bob()), 2);

        let queued: Vec<_> = buffer.queues.lock()[&bob()]
            .iter()
            .map(|f| f.candidate.clone())
            .collect();
        assert_eq!(queued, vec!["stale-2", "c3"]);
    }

    #[test]
    fn test_discard_is_per_peer() {
        let buffer = CandidateBuffer::new();
        buffer.enqueue(&bob(), HandshakeFragment::new("c1"));
        buffer.enqueue(&"carol".into(), HandshakeFragment::new("c1"));

        assert_eq!(buffer.discard(&bob()), 1);
        assert_eq!(buffer.pending(&bob()), 0);
        assert_eq!(buffer.pending(&"carol".into()), 1);

        buffer.clear();
        assert_eq!(buffer.pending(&"carol".into()), 0);
    }
}
