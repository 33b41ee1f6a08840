//! Versioned per-peer attribute store (spec.md §3, §4.2).
//!
//! A close transcription of `gossipy.state.PeerState`: the Python class's
//! `update_with_delta`/`update_local`/`deltas_after_version`/
//! `beat_that_heart`/`check_suspected` become the methods below, with the
//! dict-of-(value, version) replaced by a typed `HashMap`.

use std::collections::HashMap;

use serde_json::Value;

use crate::detector::FailureDetector;
use crate::observer::Observer;

pub type Version = u64;

/// Distinguished attribute key whose sole purpose is to generate a steady
/// stream of deltas that feed the receiver's failure detector.
pub const HEARTBEAT_KEY: &str = "__heartbeat__";

const DEFAULT_PHI_THRESHOLD: f64 = 8.0;

/// One peer's attribute map, as seen by the local process. There is exactly
/// one `PeerState` per known peer name, including the local peer itself.
pub struct PeerState {
    name: String,
    attrs: HashMap<String, (Value, Version)>,
    max_version_seen: Version,
    heartbeat_version: Version,
    detector: FailureDetector,
    alive: bool,
    phi_threshold: f64,
}

impl PeerState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: HashMap::new(),
            max_version_seen: 0,
            heartbeat_version: 0,
            detector: FailureDetector::new(),
            alive: false,
            phi_threshold: DEFAULT_PHI_THRESHOLD,
        }
    }

    pub fn with_phi_threshold(mut self, phi_threshold: f64) -> Self {
        self.phi_threshold = phi_threshold;
        self
    }

    pub fn with_detector_capacity(mut self, capacity: usize) -> Self {
        self.detector = FailureDetector::with_capacity(capacity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_version_seen(&self) -> Version {
        self.max_version_seen
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn phi_threshold(&self) -> f64 {
        self.phi_threshold
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key).map(|(v, _)| v)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Applies a delta received from a remote peer during reconciliation.
    /// No-op (and no observer notification) if `version` is not strictly
    /// newer than what's already stored — this is what makes replaying the
    /// same delta idempotent (spec.md §8 property 5).
    pub fn update_with_delta(
        &mut self,
        key: &str,
        value: Value,
        version: Version,
        now: f64,
        observer: &dyn Observer,
    ) {
        if version <= self.max_version_seen {
            return;
        }

        self.max_version_seen = version;
        self.attrs.insert(key.to_string(), (value.clone(), version));

        if key == HEARTBEAT_KEY {
            self.detector.add(now);
        }

        observer.value_changed(self, key, &value);
    }

    /// Applies a write originating from the local embedder. Always
    /// increments `max_version_seen`, so the same key can be written
    /// repeatedly without ever colliding on version.
    pub fn update_local(&mut self, key: &str, value: Value, observer: &dyn Observer) -> Version {
        self.max_version_seen += 1;
        let version = self.max_version_seen;
        self.attrs.insert(key.to_string(), (value.clone(), version));
        observer.value_changed(self, key, &value);
        version
    }

    /// All attributes strictly newer than `lowest_version`, sorted by
    /// ascending version. The ordering is load-bearing: a receiver applying
    /// these via `update_with_delta` in order always advances its own
    /// `max_version_seen` monotonically (spec.md §4.2).
    pub fn deltas_after(&self, lowest_version: Version) -> Vec<(String, Value, Version)> {
        let mut deltas: Vec<(String, Value, Version)> = self
            .attrs
            .iter()
            .filter(|(_, (_, version))| *version > lowest_version)
            .map(|(key, (value, version))| (key.clone(), value.clone(), *version))
            .collect();
        deltas.sort_by_key(|(_, _, version)| *version);
        deltas
    }

    /// Only meaningful on the local `PeerState`: bumps the heartbeat counter
    /// and writes it as a fresh local attribute, so it propagates like any
    /// other delta.
    pub fn beat_heart(&mut self, observer: &dyn Observer) {
        self.heartbeat_version += 1;
        let value = Value::from(self.heartbeat_version);
        self.update_local(HEARTBEAT_KEY, value, observer);
    }

    /// Re-evaluates liveness against the failure detector and fires
    /// `peer_alive`/`peer_dead` exactly on state-machine edges. Returns the
    /// new liveness state.
    pub fn check_suspected(&mut self, now: f64, observer: &dyn Observer) -> bool {
        let failed = self.detector.failed(now, self.phi_threshold);
        if failed {
            if self.alive {
                self.alive = false;
                observer.peer_dead(self);
            }
        } else if !self.alive {
            self.alive = true;
            observer.peer_alive(self);
        }
        self.alive
    }
}
