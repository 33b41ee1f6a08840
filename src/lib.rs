//! Scuttlebutt-style anti-entropy gossip with phi-accrual failure detection.
//!
//! A `Gossiper` ([`gossip::Gossiper`]) is a versioned key/value store per
//! peer, kept eventually consistent across a cluster by periodic digest/delta
//! exchanges, with peer liveness tracked by [`detector::FailureDetector`].

pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod gossip;
pub mod observer;
pub mod scuttle;
pub mod state;
pub mod wire;

pub use clock::{Clock, FakeClock, MonotonicClock};
pub use config::GossipConfig;
pub use detector::FailureDetector;
pub use error::Error;
pub use gossip::Gossiper;
pub use observer::{NullObserver, Observer};
pub use scuttle::ClusterView;
pub use state::PeerState;
