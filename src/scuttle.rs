//! Stateless Scuttlebutt reconciliation (spec.md §4.3) over a `ClusterView`.
//!
//! Mirrors the free-function-over-shared-state idiom of the teacher's
//! `cluster/gossip.rs` (`sync_peer_info`, `build_peer_info`, `handle_ping`
//! are plain functions taking `&Cluster`/`&mut Cluster`) rather than methods
//! on a standalone reconciler object — there is no reconciler state to own.

use std::collections::HashMap;

use crate::observer::Observer;
use crate::state::PeerState;
use crate::wire::{Deltas, Digest};

/// Owns every known `PeerState`, including the local peer's own entry
/// (looked up by name equality, per spec.md §3).
pub struct ClusterView {
    peers: HashMap<String, PeerState>,
    phi_threshold: f64,
    detector_capacity: usize,
}

impl Default for ClusterView {
    fn default() -> Self {
        let defaults = crate::config::GossipConfig::default();
        Self::with_config(defaults.phi_threshold, defaults.failure_detector_capacity)
    }
}

impl ClusterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// A view whose peers, once discovered, are built with `phi_threshold`
    /// and `detector_capacity` instead of the crate-wide defaults — used by
    /// `Gossiper::bind` so every peer it learns about honors the embedder's
    /// `GossipConfig`.
    pub fn with_config(phi_threshold: f64, detector_capacity: usize) -> Self {
        Self {
            peers: HashMap::new(),
            phi_threshold,
            detector_capacity,
        }
    }

    pub fn get(&self, name: &str) -> Option<&PeerState> {
        self.peers.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PeerState> {
        self.peers.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.peers.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PeerState)> {
        self.peers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut PeerState)> {
        self.peers.iter_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.peers.keys().map(String::as_str)
    }

    /// Ensures a `PeerState` exists for `name`, returning `true` if a new one
    /// was created. Used both for `seed()` and for names discovered during
    /// reconciliation (spec.md §3 "Lifecycle").
    pub fn ensure_peer(&mut self, name: &str) -> bool {
        if self.peers.contains_key(name) {
            false
        } else {
            let peer = PeerState::new(name)
                .with_phi_threshold(self.phi_threshold)
                .with_detector_capacity(self.detector_capacity);
            self.peers.insert(name.to_string(), peer);
            true
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, peer: PeerState) {
        self.peers.insert(name.into(), peer);
    }
}

/// The compact summary sent to kick off a gossip round: every known peer
/// name mapped to the highest version we've seen for it.
pub fn digest(view: &ClusterView) -> Digest {
    view.iter()
        .map(|(name, peer)| (name.clone(), peer.max_version_seen()))
        .collect()
}

pub struct ReconcileOutput {
    /// Deltas the remote is behind on and we can answer immediately.
    pub deltas: Deltas,
    /// Versions we are behind on and must request from the remote.
    pub requests: Digest,
    /// Names mentioned in the remote digest that we'd never heard of.
    pub new_peers: Vec<String>,
}

/// The receiver's half of the exchange: given the partner's digest, decide
/// what to send back immediately (`deltas`) and what to ask for
/// (`requests`), per the four-way comparison in spec.md §4.3.
pub fn reconcile(view: &ClusterView, remote_digest: &Digest) -> ReconcileOutput {
    let mut deltas = Deltas::new();
    let mut requests = Digest::new();
    let mut new_peers = Vec::new();

    for (name, &remote_version) in remote_digest {
        match view.get(name) {
            None => {
                new_peers.push(name.clone());
                requests.insert(name.clone(), 0);
            }
            Some(peer) => {
                let local_version = peer.max_version_seen();
                if remote_version > local_version {
                    requests.insert(name.clone(), local_version);
                } else if remote_version < local_version {
                    deltas.insert(name.clone(), peer.deltas_after(remote_version));
                }
                // Equal: nothing to do.
            }
        }
    }

    // Anything we know about that the remote didn't mention at all must be
    // introduced to them from scratch.
    for (name, peer) in view.iter() {
        if !remote_digest.contains_key(name) {
            deltas.insert(name.clone(), peer.deltas_after(0));
        }
    }

    ReconcileOutput {
        deltas,
        requests,
        new_peers,
    }
}

/// The requester's half, satisfying a partner's `requests` (spec.md §4.3).
pub fn fetch_deltas(view: &ClusterView, requests: &Digest) -> Deltas {
    requests
        .iter()
        .filter_map(|(name, &lowest_version)| {
            view.get(name)
                .map(|peer| (name.clone(), peer.deltas_after(lowest_version)))
        })
        .collect()
}

/// Applies a batch of per-peer delta lists, in the order received — relies
/// on the sender having sorted each peer's list by ascending version
/// (spec.md §4.3, §5 ordering guarantees). Creates `PeerState`s for any name
/// not yet known.
pub fn apply_deltas(view: &mut ClusterView, deltas: Deltas, now: f64, observer: &dyn Observer) {
    for (name, entries) in deltas {
        view.ensure_peer(&name);
        let peer = view.get_mut(&name).expect("just ensured");
        for (key, value, version) in entries {
            peer.update_with_delta(&key, value, version, now, observer);
        }
    }
}
