//! Shared fixtures: an in-process transport primitive and participant harness

#![allow(dead_code)]

use async_trait::async_trait;
use meshrtc::{
    HandshakeFragment, MediaManager, MediaTrack, MemoryRelay, MeshConfig, MeshEvent, MeshRtcError,
    ParticipantId, PeerConnectionPool, PeerTransport, RemoteStream, RoomId, SessionDescription,
    SignalingChannel, SimulatedCapture, TransportConfig, TransportEvent, TransportEventSender,
    TransportFactory, TransportState,
};
use meshrtc::{EventStream, TrackKind};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Transport that completes a handshake as soon as both descriptions are set
#[derive(Debug)]
pub struct MockTransport {
    id: Uuid,
    owner: ParticipantId,
    peer: ParticipantId,
    events: TransportEventSender,
    fail_offer: bool,
    auto_connect: bool,
    gate: Option<Arc<Notify>>,
    defer_candidates: AtomicBool,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    remote_applied: AtomicUsize,
    candidates: Mutex<Vec<String>>,
    tracks: Mutex<Vec<TrackKind>>,
    gathered: AtomicUsize,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    /// Candidates applied from the remote side, in order
    pub fn applied_candidates(&self) -> Vec<String> {
        self.candidates.lock().clone()
    }

    /// How many remote descriptions were applied
    pub fn remote_applied(&self) -> usize {
        self.remote_applied.load(Ordering::SeqCst)
    }

    /// Local tracks attached for sending
    pub fn tracks(&self) -> Vec<TrackKind> {
        self.tracks.lock().clone()
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reject candidates as premature even with a remote description set
    pub fn set_defer_candidates(&self, defer: bool) {
        self.defer_candidates.store(defer, Ordering::SeqCst);
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }

    /// Simulate a report from the underlying stack
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn gather(&self) {
        for _ in 0..2 {
            let n = self.gathered.fetch_add(1, Ordering::SeqCst) + 1;
            self.emit(TransportEvent::Candidate(HandshakeFragment {
                candidate: format!("candidate:{} 1 udp 2122260223 {} typ host", n, self.owner),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
            }));
        }
    }

    fn maybe_connect(&self) {
        if !self.auto_connect || self.local.lock().is_none() || self.remote.lock().is_none() {
            return;
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emit(TransportEvent::StateChanged(TransportState::Connecting));
        self.emit(TransportEvent::StateChanged(TransportState::Connected));
        // One stream carrying two tracks reports once per track
        let stream = RemoteStream {
            id: format!("stream-{}", self.peer),
            peer_id: self.peer.clone(),
            track_ids: vec!["video".to_string(), "audio".to_string()],
        };
        self.emit(TransportEvent::Track(stream.clone()));
        self.emit(TransportEvent::Track(stream));
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self) -> Result<SessionDescription, MeshRtcError> {
        self.wait_for_gate().await;
        if self.fail_offer {
            return Err(MeshRtcError::transport(self.peer.as_str(), "offer rejected"));
        }
        Ok(SessionDescription::offer(format!(
            "v=0 o={} {} offer",
            self.owner, self.id
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, MeshRtcError> {
        self.wait_for_gate().await;
        if self.remote.lock().is_none() {
            return Err(MeshRtcError::transport(self.peer.as_str(), "no remote offer"));
        }
        Ok(SessionDescription::answer(format!(
            "v=0 o={} {} answer",
            self.owner, self.id
        )))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MeshRtcError> {
        *self.local.lock() = Some(desc);
        self.gather();
        self.maybe_connect();
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MeshRtcError> {
        *self.remote.lock() = Some(desc);
        self.remote_applied.fetch_add(1, Ordering::SeqCst);
        self.maybe_connect();
        Ok(())
    }

    fn has_remote_description(&self) -> bool {
        self.remote.lock().is_some()
    }

    async fn add_candidate(&self, fragment: HandshakeFragment) -> Result<(), MeshRtcError> {
        if !self.has_remote_description() || self.defer_candidates.load(Ordering::SeqCst) {
            return Err(MeshRtcError::PrematureCandidate {
                peer_id: self.peer.to_string(),
            });
        }
        self.candidates.lock().push(fragment.candidate);
        Ok(())
    }

    fn add_track(&self, track: &MediaTrack) -> Result<(), MeshRtcError> {
        self.tracks.lock().push(track.kind());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out [`MockTransport`]s and remembering them
pub struct MockFactory {
    owner: ParticipantId,
    created: Mutex<Vec<(ParticipantId, Arc<MockTransport>)>>,
    fail_offers_to: Mutex<HashSet<ParticipantId>>,
    auto_connect: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockFactory {
    pub fn new(owner: &str) -> Arc<Self> {
        Arc::new(Self {
            owner: owner.into(),
            created: Mutex::new(Vec::new()),
            fail_offers_to: Mutex::new(HashSet::new()),
            auto_connect: AtomicBool::new(true),
            gate: Mutex::new(None),
        })
    }

    /// Transports created from now on stop before producing an offer or
    /// answer until the returned gate is notified, once per step
    pub fn hold_handshakes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Offers toward `peer` fail from now on
    pub fn fail_offers_to(&self, peer: &str) {
        self.fail_offers_to.lock().insert(peer.into());
    }

    /// Whether new transports connect on their own
    pub fn set_auto_connect(&self, enabled: bool) {
        self.auto_connect.store(enabled, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// Every transport created toward `peer`, oldest first
    pub fn transports_for(&self, peer: &str) -> Vec<Arc<MockTransport>> {
        self.created
            .lock()
            .iter()
            .filter(|(id, _)| id.as_str() == peer)
            .map(|(_, transport)| transport.clone())
            .collect()
    }

    pub fn latest(&self, peer: &str) -> Option<Arc<MockTransport>> {
        self.transports_for(peer).pop()
    }
}

impl TransportFactory for MockFactory {
    fn create(
        &self,
        peer_id: &ParticipantId,
        _config: &TransportConfig,
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>, MeshRtcError> {
        let transport = Arc::new(MockTransport {
            id: Uuid::new_v4(),
            owner: self.owner.clone(),
            peer: peer_id.clone(),
            events,
            fail_offer: self.fail_offers_to.lock().contains(peer_id),
            auto_connect: self.auto_connect.load(Ordering::SeqCst),
            gate: self.gate.lock().clone(),
            defer_candidates: AtomicBool::new(false),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            remote_applied: AtomicUsize::new(0),
            candidates: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            gathered: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.created.lock().push((peer_id.clone(), transport.clone()));
        Ok(transport)
    }
}

/// One participant wired to a shared relay
pub struct Participant {
    pub id: ParticipantId,
    pub pool: Arc<PeerConnectionPool>,
    pub signaling: Arc<SignalingChannel>,
    pub factory: Arc<MockFactory>,
    pub capture: Arc<SimulatedCapture>,
    pub media: Arc<MediaManager>,
    pub events: EventStream,
}

impl Participant {
    /// Drain queued events
    pub fn events(&mut self) -> Vec<MeshEvent> {
        self.events.drain()
    }

    pub fn transport_to(&self, peer: &str) -> Arc<MockTransport> {
        self.factory
            .latest(peer)
            .unwrap_or_else(|| panic!("{} has no transport to {}", self.id, peer))
    }
}

pub const ROOM: &str = "room-1";

pub fn topic() -> String {
    format!("webrtc-{}", ROOM)
}

pub async fn participant(relay: &MemoryRelay, id: &str) -> Participant {
    participant_with(relay, id, MeshConfig::default()).await
}

/// Route pool logs to the test output; filter with `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn participant_with(relay: &MemoryRelay, id: &str, config: MeshConfig) -> Participant {
    init_tracing();
    let factory = MockFactory::new(id);
    let capture = Arc::new(SimulatedCapture::new());
    let media = Arc::new(MediaManager::new(capture.clone()));
    let signaling = Arc::new(SignalingChannel::with_topic_prefix(
        Arc::new(relay.client()),
        config.topic_prefix.clone(),
    ));
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let pool = PeerConnectionPool::new(
        id.into(),
        config,
        factory.clone(),
        media.clone(),
        signaling.clone(),
        events_tx,
    );
    signaling
        .connect(&RoomId::from(ROOM), id.into(), pool.signal_handler())
        .await
        .expect("subscribe");

    Participant {
        id: id.into(),
        pool,
        signaling,
        factory,
        capture,
        media,
        events: EventStream::new(events_rx),
    }
}

/// Let every queued delivery, transport event and batch timer run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}

pub fn count_connected(events: &[MeshEvent], peer: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, MeshEvent::PeerConnected { peer_id } if peer_id.as_str() == peer))
        .count()
}

pub fn count_disconnected(events: &[MeshEvent], peer: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, MeshEvent::PeerDisconnected { peer_id } if peer_id.as_str() == peer))
        .count()
}

pub fn count_streams(events: &[MeshEvent], peer: &str) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(e, MeshEvent::RemoteStreamAvailable { peer_id, .. } if peer_id.as_str() == peer)
        })
        .count()
}
