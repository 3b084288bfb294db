//! Room management and API

use crate::event::EventStream;
use crate::mesh::{InitiatorPolicy, JoinReport, MeshJoin};
use crate::pool::PeerConnectionPool;
use crate::{MeshConfig, MeshRtc};
use meshrtc_core::{IceServer, MeshRtcError, ParticipantId, Room, RoomId, TrackKind};
use meshrtc_media::{
    AudioConstraints, LocalMediaSource, MediaConstraints, MediaHandle, MediaStatus,
    VideoConstraints,
};
use meshrtc_signaling::SignalingChannel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Fluent builder for room configuration and connection
#[derive(Debug)]
pub struct RoomBuilder {
    rtc: MeshRtc,
    room_id: RoomId,
    participant_id: Option<ParticipantId>,
    config: MeshConfig,
}

impl RoomBuilder {
    pub(crate) fn new(rtc: &MeshRtc, room_id: &str) -> Self {
        Self {
            rtc: rtc.clone(),
            room_id: room_id.into(),
            participant_id: None,
            config: rtc.config().clone(),
        }
    }

    /// Set participant ID (required)
    pub fn participant(mut self, id: &str) -> Self {
        self.participant_id = Some(id.into());
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: MeshConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the outgoing candidate batching window
    pub fn candidate_batch_window(mut self, window: Duration) -> Self {
        self.config.candidate_batch_window = window;
        self
    }

    /// Set or disable the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Choose which side of each pair offers
    pub fn initiator_policy(mut self, policy: InitiatorPolicy) -> Self {
        self.config.initiator_policy = policy;
        self
    }

    /// Set the relay topic prefix
    pub fn topic_prefix(mut self, prefix: &str) -> Self {
        self.config.topic_prefix = prefix.to_string();
        self
    }

    /// Set the ICE servers handed to every transport
    pub fn ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.config.transport.ice_servers = servers;
        self
    }

    /// Join the room with current configuration
    pub async fn join(self) -> Result<MeshRoom, MeshRtcError> {
        let participant_id =
            self.participant_id
                .ok_or_else(|| MeshRtcError::MissingConfiguration {
                    field: "participant_id".to_string(),
                })?;

        MeshRoom::join_internal(self.rtc, self.room_id, participant_id, self.config).await
    }
}

/// A participant's view of one mesh session
pub struct MeshRoom {
    id: RoomId,
    participant_id: ParticipantId,
    pool: Arc<PeerConnectionPool>,
    mesh: MeshJoin,
    media: Arc<dyn LocalMediaSource>,
    members: Mutex<Room>,
    events: Mutex<Option<EventStream>>,
    closed: AtomicBool,
}

impl MeshRoom {
    pub(crate) async fn join_internal(
        rtc: MeshRtc,
        room_id: RoomId,
        participant_id: ParticipantId,
        config: MeshConfig,
    ) -> Result<Self, MeshRtcError> {
        let signaling = Arc::new(SignalingChannel::with_topic_prefix(
            rtc.relay(),
            config.topic_prefix.clone(),
        ));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let policy = config.initiator_policy;
        let media = rtc.media();

        let pool = PeerConnectionPool::new(
            participant_id.clone(),
            config,
            rtc.factory(),
            media.clone(),
            signaling.clone(),
            events_tx,
        );
        signaling
            .connect(&room_id, participant_id.clone(), pool.signal_handler())
            .await?;

        let mut members = Room::new(room_id.clone());
        members.join(participant_id.clone())?;

        info!(room = %room_id, participant = %participant_id, "Joined room");
        Ok(Self {
            id: room_id,
            participant_id,
            mesh: MeshJoin::new(pool.clone(), policy),
            pool,
            media,
            members: Mutex::new(members),
            events: Mutex::new(Some(EventStream::new(events_rx))),
            closed: AtomicBool::new(false),
        })
    }

    /// Get room ID
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Get participant ID
    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &Arc<PeerConnectionPool> {
        &self.pool
    }

    /// Take the event stream. Only the first call returns it.
    pub fn events(&self) -> Option<EventStream> {
        self.events.lock().take()
    }

    fn ensure_open(&self) -> Result<(), MeshRtcError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MeshRtcError::RoomClosed {
                room_id: self.id.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local media
    // ------------------------------------------------------------------

    /// Start the camera, sized for `screen` when given. The microphone is
    /// captured but starts muted.
    pub async fn start_camera(
        &self,
        screen: Option<(u32, u32)>,
    ) -> Result<MediaHandle, MeshRtcError> {
        self.ensure_open()?;
        let video = screen
            .map(|(width, height)| VideoConstraints::for_screen(width, height))
            .unwrap_or_default();
        let constraints = MediaConstraints {
            video: Some(video),
            audio: Some(AudioConstraints::default()),
        };

        let handle = self.media.acquire(constraints).await?;
        self.media.set_enabled(TrackKind::Audio, false);
        Ok(handle)
    }

    /// Flip the camera; returns whether it is now on
    pub fn toggle_camera(&self) -> bool {
        let enabled = !self.media.status().video_enabled;
        self.media.set_enabled(TrackKind::Video, enabled)
    }

    /// Flip the microphone; returns whether it is now on
    pub fn toggle_mic(&self) -> bool {
        let enabled = !self.media.status().audio_enabled;
        self.media.set_enabled(TrackKind::Audio, enabled)
    }

    /// Stop every local track
    pub fn stop_camera(&self) {
        self.media.release();
    }

    /// Local capture state
    pub fn media_status(&self) -> MediaStatus {
        self.media.status()
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Connect to the members already present when we entered
    pub async fn connect_to_peers(
        &self,
        peers: &[ParticipantId],
    ) -> Result<JoinReport, MeshRtcError> {
        self.ensure_open()?;
        {
            // Existing members joined before us, so they precede us in the view
            let mut members = self.members.lock();
            let mut view = Room::new(self.id.clone());
            view.created_at = members.created_at;
            for peer in peers.iter().chain(members.members()) {
                if !view.contains(peer) {
                    let _ = view.join(peer.clone());
                }
            }
            *members = view;
        }
        Ok(self.mesh.connect_to_all(peers).await)
    }

    /// A member joined after us
    pub async fn member_joined(&self, peer: &ParticipantId) -> Result<JoinReport, MeshRtcError> {
        self.ensure_open()?;
        if let Err(e) = self.members.lock().join(peer.clone()) {
            warn!(%peer, "{}", e);
        }
        Ok(self.mesh.on_member_joined(peer).await)
    }

    /// A member left; closes our link to them
    pub fn member_left(&self, peer: &ParticipantId) -> bool {
        let had_link = self.pool.close(peer);
        if let Err(e) = self.members.lock().leave(peer) {
            warn!(%peer, "{}", e);
        }
        had_link
    }

    /// Current membership view
    pub fn members(&self) -> Room {
        self.members.lock().clone()
    }

    /// Current host
    pub fn host(&self) -> Option<ParticipantId> {
        self.members.lock().host().cloned()
    }

    /// Leave the room: close every link, release media, unsubscribe
    pub async fn leave(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pool.close_all().await;
        info!(room = %self.id, participant = %self.participant_id, "Left room");
    }

    /// Whether [`MeshRoom::leave`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Link health summary
    #[cfg(feature = "diagnostics")]
    pub fn health(&self) -> crate::MeshHealth {
        crate::MeshHealth::from_snapshots(&self.pool.snapshots())
    }
}

impl std::fmt::Debug for MeshRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshRoom")
            .field("id", &self.id)
            .field("participant_id", &self.participant_id)
            .field("pool", &self.pool)
            .field("closed", &self.is_closed())
            .finish()
    }
}
