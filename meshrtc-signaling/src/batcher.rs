//! Outgoing candidate batching
//!
//! Transports emit candidates in quick bursts. Rather than publishing each
//! one the moment it appears, candidates for a peer are collected for a
//! short window and then published together, one message per candidate, in
//! the order they were gathered.

use crate::channel::SignalingChannel;
use crate::protocol::SignalingMessage;
use chrono::{DateTime, Utc};
use meshrtc_core::{HandshakeFragment, ParticipantId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default accumulation window
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(100);

/// Counters for a [`CandidateBatcher`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherStats {
    /// Completed flush cycles
    pub flushes: u64,
    /// Candidates published successfully
    pub published: u64,
    /// Candidates whose publish failed
    pub failed: u64,
    /// Time of the last flush
    pub last_flush_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct OutboundBatch {
    fragments: Vec<HandshakeFragment>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct BatcherInner {
    channel: Arc<SignalingChannel>,
    local: ParticipantId,
    window: Duration,
    batches: Mutex<HashMap<ParticipantId, OutboundBatch>>,
    stats: Mutex<BatcherStats>,
}

/// Per-peer accumulator of outgoing candidates with one flush timer each
#[derive(Debug, Clone)]
pub struct CandidateBatcher {
    inner: Arc<BatcherInner>,
}

impl CandidateBatcher {
    /// Batcher publishing through `channel` as `local`
    pub fn new(channel: Arc<SignalingChannel>, local: ParticipantId, window: Duration) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                channel,
                local,
                window,
                batches: Mutex::new(HashMap::new()),
                stats: Mutex::new(BatcherStats::default()),
            }),
        }
    }

    /// Accumulation window
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Queue a candidate for `peer`, starting its flush timer if none is pending
    pub fn schedule(&self, peer: &ParticipantId, fragment: HandshakeFragment) {
        let mut batches = self.inner.batches.lock();
        let batch = batches.entry(peer.clone()).or_default();
        batch.fragments.push(fragment);

        if batch.timer.is_none() {
            let inner = self.inner.clone();
            let peer = peer.clone();
            batch.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(inner.window).await;
                inner.flush(&peer).await;
            }));
        }
    }

    /// Candidates waiting for `peer`
    pub fn pending(&self, peer: &ParticipantId) -> usize {
        self.inner
            .batches
            .lock()
            .get(peer)
            .map(|b| b.fragments.len())
            .unwrap_or(0)
    }

    /// Drop `peer`'s batch and stop its timer
    pub fn cancel(&self, peer: &ParticipantId) {
        if let Some(batch) = self.inner.batches.lock().remove(peer) {
            if let Some(timer) = batch.timer {
                timer.abort();
            }
            if !batch.fragments.is_empty() {
                debug!(%peer, dropped = batch.fragments.len(), "Candidate batch cancelled");
            }
        }
    }

    /// Drop every batch and stop every timer
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.inner.batches.lock().drain().collect();
        for (_, batch) in drained {
            if let Some(timer) = batch.timer {
                timer.abort();
            }
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> BatcherStats {
        self.inner.stats.lock().clone()
    }
}

impl BatcherInner {
    async fn flush(&self, peer: &ParticipantId) {
        let fragments = match self.batches.lock().remove(peer) {
            Some(batch) => batch.fragments,
            None => return,
        };

        let mut published = 0u64;
        let mut failed = 0u64;
        for fragment in &fragments {
            let result = match SignalingMessage::candidate(&self.local, peer, fragment) {
                Ok(message) => self.channel.publish(&message).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => published += 1,
                Err(e) => {
                    failed += 1;
                    warn!(%peer, "Candidate publish failed: {}", e);
                }
            }
        }

        debug!(%peer, published, failed, "Candidate batch flushed");
        let mut stats = self.stats.lock();
        stats.flushes += 1;
        stats.published += published;
        stats.failed += failed;
        stats.last_flush_at = Some(Utc::now());
    }
}
