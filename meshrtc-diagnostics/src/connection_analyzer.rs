//! Link state analysis and diagnostics

use chrono::{DateTime, Utc};
use meshrtc_core::{LinkState, ParticipantId, PeerLinkSnapshot};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Handshakes older than this are reported as stalled
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(10);

/// Health of a single peer link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHealth {
    /// Remote participant
    pub peer_id: ParticipantId,
    /// Current link state
    pub state: LinkState,
    /// Time since the link was created
    pub age_ms: i64,
    /// Inbound candidates still waiting for a remote description
    pub pending_candidates: usize,
    /// Handshake has run longer than the stall threshold
    pub stalled: bool,
}

/// Summary of every link held by a participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshHealth {
    /// Links in the pool
    pub total: usize,
    /// Links with an established transport
    pub connected: usize,
    /// Links still offering or answering
    pub handshaking: usize,
    /// Links in a failed or disconnected state awaiting teardown
    pub degraded: usize,
    /// Per-link details, ordered by peer
    pub links: Vec<LinkHealth>,
}

impl MeshHealth {
    /// Summarize link snapshots using the default stall threshold
    pub fn from_snapshots(snapshots: &[PeerLinkSnapshot]) -> Self {
        Self::analyze(snapshots, Utc::now(), DEFAULT_STALL_THRESHOLD)
    }

    /// Summarize link snapshots as of `now`
    pub fn analyze(
        snapshots: &[PeerLinkSnapshot],
        now: DateTime<Utc>,
        stall_threshold: Duration,
    ) -> Self {
        let mut links: Vec<LinkHealth> = snapshots
            .iter()
            .map(|snapshot| {
                let age = now - snapshot.created_at;
                // Negative ages (clock skew) never count as stalled
                let stalled = snapshot.state.is_handshaking()
                    && age.to_std().is_ok_and(|age| age > stall_threshold);
                LinkHealth {
                    peer_id: snapshot.peer_id.clone(),
                    state: snapshot.state,
                    age_ms: age.num_milliseconds(),
                    pending_candidates: snapshot.pending_candidates,
                    stalled,
                }
            })
            .collect();
        links.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));

        let count = |pred: fn(LinkState) -> bool| links.iter().filter(|l| pred(l.state)).count();
        Self {
            total: links.len(),
            connected: count(|s| s == LinkState::Connected),
            handshaking: count(LinkState::is_handshaking),
            degraded: count(|s| matches!(s, LinkState::Failed | LinkState::Disconnected)),
            links,
        }
    }

    /// Every link is connected (vacuously true for an empty mesh)
    pub fn is_fully_connected(&self) -> bool {
        self.connected == self.total
    }

    /// Peers whose handshake has stalled
    pub fn stalled_peers(&self) -> Vec<ParticipantId> {
        self.links
            .iter()
            .filter(|l| l.stalled)
            .map(|l| l.peer_id.clone())
            .collect()
    }
}
