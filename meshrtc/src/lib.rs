//! # Mesh RTC - Full-Mesh Real-Time Sessions
//!
//! Mesh RTC keeps a direct peer transport between every pair of
//! participants in a room. Handshake messages (offers, answers and
//! connectivity candidates) travel over a topic-scoped broadcast relay.
//!
//! ## Key Features
//!
//! - **One link per peer**: duplicate offers are suppressed and offer
//!   collisions are settled deterministically
//! - **Timing tolerant**: early candidates are buffered, outgoing candidates
//!   are batched, stale async results are discarded
//! - **Explicit state**: every link follows a single transition function and
//!   stalled handshakes time out
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshrtc::{MediaManager, MemoryRelay, MeshRtc, SimulatedCapture};
//! # use meshrtc::TransportFactory;
//! use std::sync::Arc;
//!
//! # async fn example(factory: Arc<dyn TransportFactory>) -> Result<(), meshrtc::MeshRtcError> {
//! let relay = MemoryRelay::new();
//! let media = Arc::new(MediaManager::new(Arc::new(SimulatedCapture::new())));
//! let rtc = MeshRtc::new(Arc::new(relay.client()), factory, media);
//!
//! let room = rtc.room("lobby").participant("alice").join().await?;
//! room.start_camera(Some((1920, 1080))).await?;
//! room.connect_to_peers(&["bob".into(), "carol".into()]).await?;
//!
//! if let Some(mut events) = room.events() {
//!     while let Some(event) = events.next().await {
//!         println!("Mesh event: {:?}", event);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use meshrtc_core::{
    HandshakeFragment, IceServer, LinkEvent, LinkState, MediaTrack, MeshRtcError, ParticipantId,
    PeerLinkSnapshot, PeerTransport, RemoteStream, Room, RoomId, SdpType, SessionDescription,
    TrackKind, TransportConfig, TransportEvent, TransportEventSender, TransportFactory,
    TransportState,
};

pub use meshrtc_media::{
    AudioConstraints, CaptureBackend, LocalMediaSource, MediaConstraints, MediaError,
    MediaHandle, MediaManager, MediaStatus, SimulatedCapture, VideoConstraints,
};

pub use meshrtc_signaling::{
    BatcherStats, BroadcastChannel, BroadcastEvent, ChannelState, MemoryRelay, RelayClient,
    SignalHandler, SignalKind, SignalingChannel, SignalingMessage,
};

#[cfg(feature = "diagnostics")]
pub use meshrtc_diagnostics::{DebugLogger, LinkHealth, MeshHealth};

// Public API modules
pub mod buffer;
pub mod config;
pub mod event;
pub mod mesh;
pub mod pool;
pub mod room;

// Re-export main API types
pub use buffer::{CandidateBuffer, DEFAULT_PENDING_LIMIT};
pub use config::MeshConfig;
pub use event::{EventStream, MeshEvent};
pub use mesh::{InitiatorPolicy, JoinReport, MeshJoin};
pub use pool::PeerConnectionPool;
pub use room::{MeshRoom, RoomBuilder};

use std::sync::Arc;

/// Main entry point for Mesh RTC
#[derive(Clone)]
pub struct MeshRtc {
    inner: Arc<MeshRtcInner>,
}

struct MeshRtcInner {
    relay: Arc<dyn BroadcastChannel>,
    factory: Arc<dyn TransportFactory>,
    media: Arc<dyn LocalMediaSource>,
    config: MeshConfig,
}

impl MeshRtc {
    /// Create an entry point over a relay connection, a transport factory
    /// and a local media source, with default settings
    pub fn new(
        relay: Arc<dyn BroadcastChannel>,
        factory: Arc<dyn TransportFactory>,
        media: Arc<dyn LocalMediaSource>,
    ) -> Self {
        Self::with_config(relay, factory, media, MeshConfig::default())
    }

    /// Create with a custom default configuration for every room
    pub fn with_config(
        relay: Arc<dyn BroadcastChannel>,
        factory: Arc<dyn TransportFactory>,
        media: Arc<dyn LocalMediaSource>,
        config: MeshConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MeshRtcInner {
                relay,
                factory,
                media,
                config,
            }),
        }
    }

    /// Create a room builder for the given room ID
    ///
    /// # Example
    /// ```rust,no_run
    /// # async fn example(rtc: meshrtc::MeshRtc) -> Result<(), meshrtc::MeshRtcError> {
    /// let room = rtc
    ///     .room("my-room")
    ///     .participant("alice")
    ///     .handshake_timeout(None)
    ///     .join()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn room(&self, id: &str) -> RoomBuilder {
        RoomBuilder::new(self, id)
    }

    /// Default room configuration
    pub fn config(&self) -> &MeshConfig {
        &self.inner.config
    }

    pub(crate) fn relay(&self) -> Arc<dyn BroadcastChannel> {
        self.inner.relay.clone()
    }

    pub(crate) fn factory(&self) -> Arc<dyn TransportFactory> {
        self.inner.factory.clone()
    }

    pub(crate) fn media(&self) -> Arc<dyn LocalMediaSource> {
        self.inner.media.clone()
    }
}

impl std::fmt::Debug for MeshRtc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshRtc")
            .field("config", &self.inner.config)
            .finish()
    }
}
