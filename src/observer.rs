//! Embedder-facing callbacks (spec.md §6), pushed synchronously from inside
//! the gossip loop.
//!
//! Modeled directly on `gossipy.gossip.Participant`: plain synchronous
//! method calls made from the loop as state changes happen, not routed
//! through a channel or async boundary. All methods are optional (default
//! no-ops) and must tolerate being re-entered from the loop thread — the
//! core does not catch panics raised from inside them.

use serde_json::Value;

use crate::gossip::Gossiper;
use crate::state::PeerState;

pub trait Observer: Send + Sync {
    /// Fired once, when the gossiper has bound its socket and determined its
    /// own name.
    fn make_connection(&self, _gossiper: &Gossiper) {}

    /// Fired whenever `key` changes value on `peer`, whether the write was
    /// local or arrived as a remote delta.
    fn value_changed(&self, _peer: &PeerState, _key: &str, _value: &Value) {}

    /// Fired on every dead→alive edge, including the first time a peer is
    /// ever observed alive. Never fired for the local peer.
    fn peer_alive(&self, _peer: &PeerState) {}

    /// Fired on every alive→dead edge. Never fired for the local peer.
    fn peer_dead(&self, _peer: &PeerState) {}
}

/// An observer that does nothing; useful for tests and for embedders that
/// only care about the map interface.
pub struct NullObserver;

impl Observer for NullObserver {}
