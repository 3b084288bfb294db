//! Mesh join protocol: who offers to whom

use crate::pool::PeerConnectionPool;
use futures::future::join_all;
use meshrtc_core::{MeshRtcError, ParticipantId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Decides which side of a participant pair sends the offer.
///
/// Under either policy simultaneous offers are still possible (for example
/// after a restart) and are settled by the pool: the smaller identity's
/// offer wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiatorPolicy {
    /// The participant entering the room offers to every existing member;
    /// existing members wait for the newcomer's offer
    #[default]
    Joiner,
    /// The lexicographically smaller identity of each pair offers
    LowerId,
}

impl InitiatorPolicy {
    /// Whether `local`, on entering a room, should offer to member `peer`
    pub fn offers_on_entry(self, local: &ParticipantId, peer: &ParticipantId) -> bool {
        match self {
            InitiatorPolicy::Joiner => true,
            InitiatorPolicy::LowerId => local < peer,
        }
    }

    /// Whether `local` should offer to `peer`, who just joined
    pub fn offers_to_newcomer(self, local: &ParticipantId, peer: &ParticipantId) -> bool {
        match self {
            InitiatorPolicy::Joiner => false,
            InitiatorPolicy::LowerId => local < peer,
        }
    }
}

/// Outcome of a join attempt
#[derive(Debug, Default)]
pub struct JoinReport {
    /// Peers an offer was sent to
    pub initiated: Vec<ParticipantId>,
    /// Peers left alone: self, duplicates, existing links, or excluded by policy.
    /// A link that appeared while the round was running, for example from
    /// the peer's own offer, also counts as skipped.
    pub skipped: Vec<ParticipantId>,
    /// Peers whose initiation failed
    pub failed: Vec<(ParticipantId, MeshRtcError)>,
}

impl JoinReport {
    /// Whether every attempted initiation succeeded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Connects a participant to the rest of its room
#[derive(Debug, Clone)]
pub struct MeshJoin {
    pool: Arc<PeerConnectionPool>,
    policy: InitiatorPolicy,
}

impl MeshJoin {
    /// Join helper over `pool`
    pub fn new(pool: Arc<PeerConnectionPool>, policy: InitiatorPolicy) -> Self {
        Self { pool, policy }
    }

    /// Active initiator policy
    pub fn policy(&self) -> InitiatorPolicy {
        self.policy
    }

    /// Offer to every listed member, concurrently, on entering a room.
    ///
    /// One failed initiation does not stop the others.
    pub async fn connect_to_all(&self, peers: &[ParticipantId]) -> JoinReport {
        let local = self.pool.local_id().clone();
        let policy = self.policy;
        self.initiate_where(peers, |peer| policy.offers_on_entry(&local, peer))
            .await
    }

    /// React to a member joining after us
    pub async fn on_member_joined(&self, peer: &ParticipantId) -> JoinReport {
        let local = self.pool.local_id().clone();
        let policy = self.policy;
        self.initiate_where(std::slice::from_ref(peer), |peer| {
            policy.offers_to_newcomer(&local, peer)
        })
        .await
    }

    async fn initiate_where(
        &self,
        peers: &[ParticipantId],
        should_offer: impl Fn(&ParticipantId) -> bool,
    ) -> JoinReport {
        let mut report = JoinReport::default();
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for peer in peers {
            let eligible = peer != self.pool.local_id()
                && seen.insert(peer.clone())
                && !self.pool.contains(peer)
                && should_offer(peer);
            if eligible {
                targets.push(peer.clone());
            } else {
                report.skipped.push(peer.clone());
            }
        }

        let results = join_all(targets.iter().map(|peer| self.pool.initiate(peer))).await;
        for (peer, result) in targets.into_iter().zip(results) {
            match result {
                Ok(true) => report.initiated.push(peer),
                Ok(false) => report.skipped.push(peer),
                Err(e) => {
                    warn!(%peer, "Initiation failed: {}", e);
                    report.failed.push((peer, e));
                }
            }
        }

        if !report.initiated.is_empty() || !report.failed.is_empty() {
            info!(
                initiated = report.initiated.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "Mesh join round finished"
            );
        }
        report
    }
}
