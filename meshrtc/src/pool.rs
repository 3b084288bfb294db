//! Peer connection pool
//!
//! Owns one link per remote participant and drives each through the
//! [`LinkState`] machine: offer or answer generation, remote description
//! application, candidate exchange, connectivity and teardown.
//!
//! Link state lives behind a synchronous mutex that is never held across an
//! `.await`. Every async step records the `link_id` it started on and checks
//! afterwards that the link is still current before acting on its result, so
//! a link torn down (or replaced) mid-handshake never receives stale work.

use crate::buffer::CandidateBuffer;
use crate::config::MeshConfig;
use crate::event::MeshEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meshrtc_core::{
    HandshakeFragment, LinkEvent, LinkState, MeshRtcError, ParticipantId, PeerLinkSnapshot,
    PeerTransport, SessionDescription, TransportEvent, TransportFactory, TransportState,
};
use meshrtc_media::LocalMediaSource;
use meshrtc_signaling::{
    BatcherStats, CandidateBatcher, SignalHandler, SignalingChannel, SignalingMessage,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

struct PeerLink {
    link_id: Uuid,
    transport: Arc<dyn PeerTransport>,
    state: LinkState,
    connecting: bool,
    remote_sdp: Option<String>,
    /// Remote offers dropped because our own offer won the collision
    yielded_offers: HashSet<String>,
    announced_streams: HashSet<String>,
    created_at: DateTime<Utc>,
    forwarder: JoinHandle<()>,
    handshake_timer: Option<JoinHandle<()>>,
}

impl PeerLink {
    fn transition(
        &mut self,
        peer: &ParticipantId,
        event: LinkEvent,
    ) -> Result<LinkState, MeshRtcError> {
        let next = self.state.on(event).map_err(|e| e.for_peer(peer))?;
        if next != self.state {
            debug!(%peer, from = %self.state, to = %next, ?event, "Link transition");
        }
        self.state = next;
        Ok(next)
    }

    fn handle(&self) -> (Uuid, Arc<dyn PeerTransport>) {
        (self.link_id, self.transport.clone())
    }
}

enum OfferPlan {
    Ignore,
    Answer(Uuid, Arc<dyn PeerTransport>),
    Restart(Uuid),
}

/// Manages the transport to every remote participant in a mesh
pub struct PeerConnectionPool {
    local_id: ParticipantId,
    config: MeshConfig,
    factory: Arc<dyn TransportFactory>,
    media: Arc<dyn LocalMediaSource>,
    signaling: Arc<SignalingChannel>,
    batcher: CandidateBatcher,
    buffer: CandidateBuffer,
    links: Mutex<HashMap<ParticipantId, PeerLink>>,
    events: mpsc::UnboundedSender<MeshEvent>,
    self_ref: Weak<PeerConnectionPool>,
}

impl PeerConnectionPool {
    /// Create a pool for `local_id`.
    ///
    /// The pool publishes through `signaling` but does not connect it; hand
    /// [`PeerConnectionPool::signal_handler`] to
    /// [`SignalingChannel::connect`] to receive messages.
    pub fn new(
        local_id: ParticipantId,
        config: MeshConfig,
        factory: Arc<dyn TransportFactory>,
        media: Arc<dyn LocalMediaSource>,
        signaling: Arc<SignalingChannel>,
        events: mpsc::UnboundedSender<MeshEvent>,
    ) -> Arc<Self> {
        let batcher = CandidateBatcher::new(
            signaling.clone(),
            local_id.clone(),
            config.candidate_batch_window,
        );
        Arc::new_cyclic(|self_ref| Self {
            local_id,
            config,
            factory,
            media,
            signaling,
            batcher,
            buffer: CandidateBuffer::new(),
            links: Mutex::new(HashMap::new()),
            events,
            self_ref: self_ref.clone(),
        })
    }

    /// Handler to register with the signaling channel
    pub fn signal_handler(&self) -> Weak<dyn SignalHandler> {
        self.self_ref.clone()
    }

    /// Local identity
    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    /// Pool configuration
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Start a connection to `peer` by sending an offer.
    ///
    /// Returns whether an offer was published. A link that already exists is
    /// left alone and yields `Ok(false)`. If the offer cannot be generated or
    /// published the link is removed, so calling again starts over.
    pub async fn initiate(&self, peer: &ParticipantId) -> Result<bool, MeshRtcError> {
        if peer == &self.local_id {
            return Err(MeshRtcError::SelfConnection {
                participant_id: peer.to_string(),
            });
        }

        let (link_id, transport) = {
            let mut links = self.links.lock();
            if let Some(existing) = links.get(peer) {
                debug!(
                    %peer,
                    state = %existing.state,
                    connecting = existing.connecting,
                    "Link exists, not initiating"
                );
                return Ok(false);
            }
            let mut link = self.create_link(peer)?;
            link.transition(peer, LinkEvent::LocalOffer)?;
            link.connecting = true;
            link.handshake_timer = self.arm_handshake_timer(peer, link.link_id);
            let handle = link.handle();
            links.insert(peer.clone(), link);
            handle
        };
        info!(%peer, "Initiating connection");

        let offer = match local_offer(transport.as_ref()).await {
            Ok(offer) => offer,
            Err(e) => {
                error!(%peer, "Offer generation failed: {}", e);
                self.fail(peer, link_id, LinkEvent::Failed, false);
                return Err(e);
            }
        };

        if !self.is_current(peer, link_id, |link| link.state == LinkState::Offering) {
            debug!(%peer, "Discarding offer for superseded link");
            return Ok(false);
        }

        let message = SignalingMessage::offer(&self.local_id, peer, &offer)?;
        if let Err(e) = self.signaling.publish(&message).await {
            error!(%peer, "Offer publish failed: {}", e);
            self.fail(peer, link_id, LinkEvent::Failed, false);
            return Err(e);
        }

        debug!(%peer, "Offer sent");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Apply a remote offer and answer it
    pub async fn handle_offer(
        &self,
        from: ParticipantId,
        desc: SessionDescription,
    ) -> Result<(), MeshRtcError> {
        if from == self.local_id {
            return Ok(());
        }

        let (link_id, transport) = loop {
            match self.plan_offer(&from, &desc)? {
                OfferPlan::Ignore => return Ok(()),
                OfferPlan::Answer(link_id, transport) => break (link_id, transport),
                OfferPlan::Restart(old) => {
                    info!(peer = %from, "Peer restarted, replacing link");
                    self.teardown(&from, Some(old), true);
                }
            }
        };

        if let Err(e) = transport.set_remote_description(desc).await {
            error!(peer = %from, "Applying remote offer failed: {}", e);
            self.fail(&from, link_id, LinkEvent::Failed, false);
            return Err(e);
        }
        if !self.is_current(&from, link_id, |_| true) {
            return Ok(());
        }
        self.buffer.flush(&from, transport.as_ref()).await;

        let answer = match local_answer(transport.as_ref()).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(peer = %from, "Answer generation failed: {}", e);
                self.fail(&from, link_id, LinkEvent::Failed, false);
                return Err(e);
            }
        };

        // The transport may already report connectivity at this point
        if !self.is_current(&from, link_id, |link| {
            matches!(link.state, LinkState::Answering | LinkState::Connected)
        }) {
            debug!(peer = %from, "Discarding answer for superseded link");
            return Ok(());
        }

        let message = SignalingMessage::answer(&self.local_id, &from, &answer)?;
        self.signaling.publish(&message).await?;
        debug!(peer = %from, "Answer sent");
        Ok(())
    }

    fn plan_offer(
        &self,
        from: &ParticipantId,
        desc: &SessionDescription,
    ) -> Result<OfferPlan, MeshRtcError> {
        let mut links = self.links.lock();
        let Some(link) = links.get_mut(from) else {
            let mut link = self.create_link(from)?;
            link.transition(from, LinkEvent::RemoteOffer)?;
            link.remote_sdp = Some(desc.sdp.clone());
            link.handshake_timer = self.arm_handshake_timer(from, link.link_id);
            let (link_id, transport) = link.handle();
            links.insert(from.clone(), link);
            debug!(peer = %from, "Answering new offer");
            return Ok(OfferPlan::Answer(link_id, transport));
        };

        if link.remote_sdp.as_deref() == Some(desc.sdp.as_str())
            || link.yielded_offers.contains(&desc.sdp)
        {
            debug!(peer = %from, "Ignoring redelivered offer");
            return Ok(OfferPlan::Ignore);
        }

        match link.state {
            LinkState::Offering if self.local_id.wins_glare_against(from) => {
                info!(peer = %from, "Offer collision, keeping local offer");
                link.yielded_offers.insert(desc.sdp.clone());
                Ok(OfferPlan::Ignore)
            }
            LinkState::Connected | LinkState::Answering => Ok(OfferPlan::Restart(link.link_id)),
            _ => {
                if link.state == LinkState::Offering {
                    info!(peer = %from, "Offer collision, yielding to remote offer");
                }
                link.transition(from, LinkEvent::RemoteOffer)?;
                link.connecting = false;
                link.remote_sdp = Some(desc.sdp.clone());
                Ok(OfferPlan::Answer(link.link_id, link.transport.clone()))
            }
        }
    }

    /// Apply a remote answer to our outstanding offer
    pub async fn handle_answer(
        &self,
        from: ParticipantId,
        desc: SessionDescription,
    ) -> Result<(), MeshRtcError> {
        let (link_id, transport) = {
            let mut links = self.links.lock();
            match links.get_mut(&from) {
                Some(link) if link.state == LinkState::Offering && link.remote_sdp.is_none() => {
                    link.remote_sdp = Some(desc.sdp.clone());
                    link.handle()
                }
                Some(link) => {
                    debug!(peer = %from, state = %link.state, "Ignoring unexpected answer");
                    return Ok(());
                }
                None => {
                    debug!(peer = %from, "Ignoring answer without a link");
                    return Ok(());
                }
            }
        };

        if let Err(e) = transport.set_remote_description(desc).await {
            error!(peer = %from, "Applying remote answer failed: {}", e);
            self.fail(&from, link_id, LinkEvent::Failed, false);
            return Err(e);
        }
        if self.is_current(&from, link_id, |_| true) {
            self.buffer.flush(&from, transport.as_ref()).await;
        }
        Ok(())
    }

    /// Apply a remote candidate, or hold it until the link can accept it
    pub async fn handle_candidate(
        &self,
        from: ParticipantId,
        fragment: HandshakeFragment,
    ) -> Result<(), MeshRtcError> {
        let transport = self
            .links
            .lock()
            .get(&from)
            .map(|link| link.transport.clone());

        match transport {
            Some(transport) if transport.has_remote_description() => {
                match transport.add_candidate(fragment.clone()).await {
                    Ok(()) => {
                        trace!(peer = %from, "Candidate applied");
                        Ok(())
                    }
                    Err(MeshRtcError::PrematureCandidate { .. }) => {
                        self.buffer.enqueue(&from, fragment);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            _ => {
                self.buffer.enqueue(&from, fragment);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Transport events and timers
    // ------------------------------------------------------------------

    fn on_transport_event(&self, peer: &ParticipantId, link_id: Uuid, event: TransportEvent) {
        match event {
            TransportEvent::Candidate(fragment) => {
                if self.is_current(peer, link_id, |_| true) {
                    self.batcher.schedule(peer, fragment);
                }
            }
            TransportEvent::Track(stream) => {
                let first_sighting = {
                    let mut links = self.links.lock();
                    match links.get_mut(peer) {
                        Some(link) if link.link_id == link_id => {
                            link.announced_streams.insert(stream.id.clone())
                        }
                        _ => false,
                    }
                };
                if first_sighting {
                    info!(%peer, stream = %stream.id, "Remote stream available");
                    self.emit(MeshEvent::RemoteStreamAvailable {
                        peer_id: peer.clone(),
                        stream,
                    });
                }
            }
            TransportEvent::StateChanged(TransportState::Connected) => {
                let newly_connected = {
                    let mut links = self.links.lock();
                    match links.get_mut(peer) {
                        Some(link) if link.link_id == link_id => {
                            let was_connected = link.state == LinkState::Connected;
                            match link.transition(peer, LinkEvent::Connected) {
                                Ok(_) => {
                                    link.connecting = false;
                                    if let Some(timer) = link.handshake_timer.take() {
                                        timer.abort();
                                    }
                                    !was_connected
                                }
                                Err(e) => {
                                    warn!(%peer, "Ignoring connectivity report: {}", e);
                                    false
                                }
                            }
                        }
                        _ => false,
                    }
                };
                if newly_connected {
                    info!(%peer, "Peer connected");
                    self.emit(MeshEvent::PeerConnected {
                        peer_id: peer.clone(),
                    });
                }
            }
            TransportEvent::StateChanged(TransportState::Disconnected) => {
                warn!(%peer, "Transport disconnected");
                self.fail(peer, link_id, LinkEvent::Disconnected, true);
            }
            TransportEvent::StateChanged(TransportState::Failed) => {
                warn!(%peer, "Transport failed");
                self.fail(peer, link_id, LinkEvent::Failed, true);
            }
            TransportEvent::StateChanged(state) => {
                trace!(%peer, %state, "Transport state");
            }
        }
    }

    fn arm_handshake_timer(&self, peer: &ParticipantId, link_id: Uuid) -> Option<JoinHandle<()>> {
        let timeout = self.config.handshake_timeout?;
        let pool = self.self_ref.clone();
        let peer = peer.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(pool) = pool.upgrade() {
                pool.on_handshake_timeout(&peer, link_id, timeout);
            }
        }))
    }

    fn on_handshake_timeout(&self, peer: &ParticipantId, link_id: Uuid, timeout: Duration) {
        if !self.is_current(peer, link_id, |link| link.state.is_handshaking()) {
            return;
        }
        let err = MeshRtcError::HandshakeTimeout {
            peer_id: peer.to_string(),
            duration: timeout,
        };
        warn!(%peer, "{}", err);
        self.fail(peer, link_id, LinkEvent::HandshakeTimeout, true);
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Close the link to `peer` without notifying. Returns whether one existed.
    pub fn close(&self, peer: &ParticipantId) -> bool {
        self.teardown(peer, None, false)
    }

    /// Close every link, release local media and leave the signaling topic
    pub async fn close_all(&self) {
        let links: Vec<(ParticipantId, PeerLink)> = self.links.lock().drain().collect();
        let count = links.len();
        for (peer, link) in links {
            self.dispose(&peer, link, false);
        }
        self.batcher.cancel_all();
        self.buffer.clear();
        self.media.release();
        self.signaling.disconnect().await;
        info!(local = %self.local_id, links = count, "Mesh closed");
    }

    fn fail(&self, peer: &ParticipantId, link_id: Uuid, event: LinkEvent, notify: bool) {
        if let Some(link) = self.links.lock().get_mut(peer) {
            if link.link_id == link_id {
                if let Err(e) = link.transition(peer, event) {
                    debug!(%peer, "{}", e);
                }
            }
        }
        self.teardown(peer, Some(link_id), notify);
    }

    fn teardown(&self, peer: &ParticipantId, link_id: Option<Uuid>, notify: bool) -> bool {
        let link = {
            let mut links = self.links.lock();
            match links.get(peer) {
                Some(link) if link_id.map_or(true, |id| id == link.link_id) => links.remove(peer),
                _ => None,
            }
        };
        match link {
            Some(link) => {
                self.dispose(peer, link, notify);
                true
            }
            None => false,
        }
    }

    fn dispose(&self, peer: &ParticipantId, mut link: PeerLink, notify: bool) {
        let last_state = link.state;
        let _ = link.transition(peer, LinkEvent::Close);
        link.transport.close();
        self.batcher.cancel(peer);
        let dropped = self.buffer.discard(peer);
        if let Some(timer) = link.handshake_timer.take() {
            timer.abort();
        }
        info!(%peer, state = %last_state, dropped_candidates = dropped, "Link closed");
        if notify {
            self.emit(MeshEvent::PeerDisconnected {
                peer_id: peer.clone(),
            });
        }
        // May be the calling task; abort takes effect at its next await
        link.forwarder.abort();
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn create_link(&self, peer: &ParticipantId) -> Result<PeerLink, MeshRtcError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = self.factory.create(peer, &self.config.transport, tx)?;

        if let Some(media) = self.media.current() {
            for track in &media.tracks {
                if let Err(e) = transport.add_track(track) {
                    warn!(%peer, track = %track.kind(), "Attaching local track failed: {}", e);
                }
            }
        }

        let link_id = Uuid::new_v4();
        let forwarder = tokio::spawn(forward_transport_events(
            self.self_ref.clone(),
            peer.clone(),
            link_id,
            rx,
        ));

        Ok(PeerLink {
            link_id,
            transport,
            state: LinkState::Idle,
            connecting: false,
            remote_sdp: None,
            yielded_offers: HashSet::new(),
            announced_streams: HashSet::new(),
            created_at: Utc::now(),
            forwarder,
            handshake_timer: None,
        })
    }

    fn is_current(
        &self,
        peer: &ParticipantId,
        link_id: Uuid,
        check: impl FnOnce(&PeerLink) -> bool,
    ) -> bool {
        self.links
            .lock()
            .get(peer)
            .is_some_and(|link| link.link_id == link_id && check(link))
    }

    fn emit(&self, event: MeshEvent) {
        if self.events.send(event).is_err() {
            trace!("No event listener");
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Whether a link to `peer` exists
    pub fn contains(&self, peer: &ParticipantId) -> bool {
        self.links.lock().contains_key(peer)
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.links.lock().len()
    }

    /// Whether the pool holds no links
    pub fn is_empty(&self) -> bool {
        self.links.lock().is_empty()
    }

    /// State of the link to `peer`
    pub fn link_state(&self, peer: &ParticipantId) -> Option<LinkState> {
        self.links.lock().get(peer).map(|link| link.state)
    }

    /// Whether an offer toward `peer` is outstanding
    pub fn is_connecting(&self, peer: &ParticipantId) -> bool {
        self.links
            .lock()
            .get(peer)
            .is_some_and(|link| link.connecting)
    }

    /// Linked participants, sorted
    pub fn peer_ids(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.links.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Inbound candidates held for `peer`
    pub fn pending_candidates(&self, peer: &ParticipantId) -> usize {
        self.buffer.pending(peer)
    }

    /// Outgoing candidate counters
    pub fn batcher_stats(&self) -> BatcherStats {
        self.batcher.stats()
    }

    /// Point-in-time view of every link, sorted by peer
    pub fn snapshots(&self) -> Vec<PeerLinkSnapshot> {
        let mut snapshots: Vec<_> = self
            .links
            .lock()
            .iter()
            .map(|(peer, link)| PeerLinkSnapshot {
                peer_id: peer.clone(),
                link_id: link.link_id,
                state: link.state,
                connecting: link.connecting,
                created_at: link.created_at,
                pending_candidates: self.buffer.pending(peer),
            })
            .collect();
        snapshots.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        snapshots
    }
}

impl std::fmt::Debug for PeerConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnectionPool")
            .field("local_id", &self.local_id)
            .field("peers", &self.peer_ids())
            .finish()
    }
}

impl Drop for PeerConnectionPool {
    fn drop(&mut self) {
        for (_, link) in self.links.get_mut().drain() {
            link.transport.close();
            link.forwarder.abort();
            if let Some(timer) = link.handshake_timer {
                timer.abort();
            }
        }
        self.batcher.cancel_all();
    }
}

#[async_trait]
impl SignalHandler for PeerConnectionPool {
    async fn handle_offer(
        &self,
        from: ParticipantId,
        desc: SessionDescription,
    ) -> Result<(), MeshRtcError> {
        PeerConnectionPool::handle_offer(self, from, desc).await
    }

    async fn handle_answer(
        &self,
        from: ParticipantId,
        desc: SessionDescription,
    ) -> Result<(), MeshRtcError> {
        PeerConnectionPool::handle_answer(self, from, desc).await
    }

    async fn handle_candidate(
        &self,
        from: ParticipantId,
        fragment: HandshakeFragment,
    ) -> Result<(), MeshRtcError> {
        PeerConnectionPool::handle_candidate(self, from, fragment).await
    }
}

async fn local_offer(transport: &dyn PeerTransport) -> Result<SessionDescription, MeshRtcError> {
    let offer = transport.create_offer().await?;
    transport.set_local_description(offer.clone()).await?;
    Ok(offer)
}

async fn local_answer(transport: &dyn PeerTransport) -> Result<SessionDescription, MeshRtcError> {
    let answer = transport.create_answer().await?;
    transport.set_local_description(answer.clone()).await?;
    Ok(answer)
}

async fn forward_transport_events(
    pool: Weak<PeerConnectionPool>,
    peer: ParticipantId,
    link_id: Uuid,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.on_transport_event(&peer, link_id, event);
    }
}
