//! # Mesh RTC Signaling
//!
//! Handshake plumbing for mesh sessions. Offers, answers and candidates
//! travel over a topic-scoped broadcast relay; this crate defines the wire
//! messages, the relay contract with an in-process implementation, the
//! room-scoped [`SignalingChannel`] and the outgoing [`CandidateBatcher`].

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod batcher;
pub mod channel;
pub mod protocol;
pub mod relay;

// Re-export main types
pub use batcher::{BatcherStats, CandidateBatcher, DEFAULT_BATCH_WINDOW};
pub use channel::{
    ChannelInfo, ChannelState, SignalHandler, SignalingChannel, DEFAULT_TOPIC_PREFIX,
};
pub use protocol::{BroadcastEvent, SignalKind, SignalingMessage};
pub use relay::{BroadcastChannel, MemoryRelay, RelayClient, Subscription, DEFAULT_HISTORY_LIMIT};
