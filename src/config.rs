//! Programmatic configuration (spec.md §10.4 of the expanded spec). Loading
//! from file or environment is out of scope — embedders construct this
//! directly.

/// Tunables for one `Gossiper` instance. All fields have defaults matching
/// spec.md's worked examples.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// How often the local peer bumps its heartbeat attribute.
    pub heartbeat_interval_secs: f64,
    /// How often a gossip round is initiated against a random partner.
    pub gossip_interval_secs: f64,
    /// Suspicion level above which a peer is considered failed.
    pub phi_threshold: f64,
    /// Bound on the failure detector's inter-arrival ring buffer, per peer.
    pub failure_detector_capacity: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 1.0,
            gossip_interval_secs: 0.5,
            phi_threshold: 8.0,
            failure_detector_capacity: 1000,
        }
    }
}
