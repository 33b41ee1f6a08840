//! The `Gossiper`: UDP transport, round timers, and wire dispatch
//! (spec.md §4.4, §6).
//!
//! Grounded in the teacher's `cluster::gossip::start_gossip` for the
//! single-socket/two-task shape (one task reads, the select loop drives
//! timers), generalized with the three-way exchange and partner-selection
//! logic from `gossipy.gossip.Gossiper._gossip`/`_gossip_with_peer`.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::time::{self, Duration};
use tracing::{debug, error, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::GossipConfig;
use crate::error::Error;
use crate::observer::{NullObserver, Observer};
use crate::scuttle::{self, ClusterView};
use crate::state::PeerState;
use crate::wire::{name_from_bind_addr, parse_peer_name, WireMessage};

/// A running gossiper: owns a bound UDP socket, the shared `ClusterView`,
/// and the timers that drive heartbeats and gossip rounds.
///
/// Cheap to clone — every clone shares the same socket and view, mirroring
/// the teacher's `Arc<UdpSocket>` handed to two cooperating tasks.
#[derive(Clone)]
pub struct Gossiper {
    name: String,
    socket: Arc<UdpSocket>,
    view: Arc<Mutex<ClusterView>>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
    config: GossipConfig,
}

impl Gossiper {
    /// Binds `bind_addr` and derives this peer's name from the bound,
    /// concrete socket address (spec.md §4.4: wildcard binds are rejected).
    pub async fn bind(
        bind_addr: SocketAddr,
        config: GossipConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, Error> {
        Self::bind_with_clock(bind_addr, config, observer, Arc::new(MonotonicClock::new())).await
    }

    pub async fn bind_with_clock(
        bind_addr: SocketAddr,
        config: GossipConfig,
        observer: Arc<dyn Observer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let socket = UdpSocket::bind(bind_addr).await.map_err(Error::Transport)?;
        let local_addr = socket.local_addr().map_err(Error::Transport)?;
        let name = name_from_bind_addr(local_addr)?;

        let mut view = ClusterView::with_config(config.phi_threshold, config.failure_detector_capacity);
        view.insert(
            &name,
            PeerState::new(&name)
                .with_phi_threshold(config.phi_threshold)
                .with_detector_capacity(config.failure_detector_capacity),
        );

        let gossiper = Self {
            name,
            socket: Arc::new(socket),
            view: Arc::new(Mutex::new(view)),
            clock,
            observer,
            config,
        };
        gossiper.observer.make_connection(&gossiper);
        Ok(gossiper)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Introduces peers this gossiper should try gossiping with, without
    /// waiting to hear from them first (spec.md §3 "Lifecycle": seed peers
    /// enter as unknown and become known as soon as any message arrives).
    pub fn seed(&self, names: impl IntoIterator<Item = impl AsRef<str>>) -> Result<(), Error> {
        let mut view = self.view.lock();
        for raw in names {
            let name = parse_peer_name(raw.as_ref())?;
            view.ensure_peer(&name);
        }
        Ok(())
    }

    // ---- map-like embedder API (spec.md §6) ----------------------------

    pub fn get(&self, key: &str) -> Option<Value> {
        self.view.lock().get(&self.name).and_then(|p| p.get(key).cloned())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.view.lock().get(&self.name).is_some_and(|p| p.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.view.lock().get(&self.name).map_or(0, PeerState::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The local peer's attribute keys, mirroring the original `Gossiper`'s
    /// `__iter__` (which iterates `self.state`).
    pub fn keys(&self) -> Vec<String> {
        self.view
            .lock()
            .get(&self.name)
            .map(|p| p.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn set(&self, key: &str, value: Value) {
        let mut view = self.view.lock();
        if let Some(peer) = view.get_mut(&self.name) {
            peer.update_local(key, value, self.observer.as_ref());
        }
    }

    /// Always returns `Err(Error::UnsupportedOperation)` — deletion has no
    /// meaning in a monotonically versioned store (spec.md §6, scenario S6).
    pub fn delete(&self, _key: &str) -> Result<(), Error> {
        Err(Error::UnsupportedOperation("delete"))
    }

    /// Snapshot of every peer this gossiper currently believes is alive,
    /// excluding itself.
    pub fn live_peers(&self) -> Vec<String> {
        self.view
            .lock()
            .iter()
            .filter(|(name, peer)| name.as_str() != self.name && peer.is_alive())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Snapshot of every known peer this gossiper currently believes is
    /// dead, excluding itself.
    pub fn dead_peers(&self) -> Vec<String> {
        self.view
            .lock()
            .iter()
            .filter(|(name, peer)| name.as_str() != self.name && !peer.is_alive())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Runs the heartbeat timer, the gossip timer, and the datagram receive
    /// loop forever. Intended to be spawned as a single task, matching the
    /// single-logical-executor realization in spec.md §5.
    pub async fn run(&self) {
        self.run_with_rng(StdRng::from_entropy()).await
    }

    /// As `run`, but with an injectable RNG so partner selection can be made
    /// deterministic in tests (spec.md §9 open question: RNG choice).
    pub async fn run_with_rng(&self, mut rng: impl RngCore + Send) {
        let mut heartbeat_timer = time::interval(Duration::from_secs_f64(
            self.config.heartbeat_interval_secs.max(0.001),
        ));
        let mut gossip_timer = time::interval(Duration::from_secs_f64(
            self.config.gossip_interval_secs.max(0.001),
        ));
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            tokio::select! {
                _ = heartbeat_timer.tick() => {
                    self.beat_heart();
                }
                _ = gossip_timer.tick() => {
                    self.gossip_round(&mut rng).await;
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => self.handle_datagram(&buf[..len], from).await,
                        Err(e) => error!(error = %e, "udp recv_from failed"),
                    }
                }
            }
        }
    }

    fn beat_heart(&self) {
        let mut view = self.view.lock();
        if let Some(peer) = view.get_mut(&self.name) {
            peer.beat_heart(self.observer.as_ref());
        }
    }

    /// One round: gossip with a random live peer, probabilistically also
    /// gossip with a random dead peer (to rediscover recoveries), then
    /// re-evaluate suspicion for everyone (spec.md §4.1, scenario S5).
    async fn gossip_round(&self, rng: &mut (impl RngCore + Send + ?Sized)) {
        let (live, dead) = {
            let view = self.view.lock();
            let live: Vec<String> = view
                .iter()
                .filter(|(n, p)| n.as_str() != self.name && p.is_alive())
                .map(|(n, _)| n.clone())
                .collect();
            let dead: Vec<String> = view
                .iter()
                .filter(|(n, p)| n.as_str() != self.name && !p.is_alive())
                .map(|(n, _)| n.clone())
                .collect();
            (live, dead)
        };

        if let Some(partner) = pick(rng, &live) {
            self.gossip_with(partner).await;
        }

        let probability = dead.len() as f64 / (live.len() + 1) as f64;
        if rng.gen::<f64>() < probability {
            if let Some(partner) = pick(rng, &dead) {
                self.gossip_with(partner).await;
            }
        }

        let now = self.clock.now_secs();
        let mut view = self.view.lock();
        let local_name = self.name.clone();
        for (name, peer) in view.iter_mut() {
            if name != &local_name {
                peer.check_suspected(now, self.observer.as_ref());
            }
        }
    }

    async fn gossip_with(&self, partner_name: &str) {
        let digest = { scuttle::digest(&self.view.lock()) };
        let message = WireMessage::Request { digest };
        self.send_to(&message, partner_name).await;
    }

    async fn send_to(&self, message: &WireMessage, peer_name: &str) {
        let addr: SocketAddr = match peer_name.parse() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(peer = peer_name, error = %e, "cannot resolve peer name to a socket address");
                return;
            }
        };
        let bytes = match message.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                error!(error = %e, "failed to encode outgoing message");
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&bytes, addr).await {
            warn!(peer = peer_name, error = %e, "send_to failed");
        }
    }

    async fn handle_datagram(&self, bytes: &[u8], from: SocketAddr) {
        let message = match WireMessage::from_bytes(bytes) {
            Ok(m) => m,
            Err(e) => {
                debug!(from = %from, error = %e, "dropping malformed datagram");
                return;
            }
        };
        let peer_name = from.to_string();

        match message {
            WireMessage::Request { digest } => {
                let recon = {
                    let mut view = self.view.lock();
                    let recon = scuttle::reconcile(&view, &digest);
                    for name in &recon.new_peers {
                        view.ensure_peer(name);
                    }
                    recon
                };
                let response = WireMessage::FirstResponse {
                    digest: recon.requests,
                    updates: recon.deltas,
                };
                self.send_to(&response, &peer_name).await;
            }
            WireMessage::FirstResponse { digest, updates } => {
                let now = self.clock.now_secs();
                let answers = {
                    let mut view = self.view.lock();
                    scuttle::apply_deltas(&mut view, updates, now, self.observer.as_ref());
                    scuttle::fetch_deltas(&view, &digest)
                };
                let response = WireMessage::SecondResponse { updates: answers };
                self.send_to(&response, &peer_name).await;
            }
            WireMessage::SecondResponse { updates } => {
                let now = self.clock.now_secs();
                let mut view = self.view.lock();
                scuttle::apply_deltas(&mut view, updates, now, self.observer.as_ref());
            }
        }
    }
}

fn pick<'a, R: RngCore + ?Sized>(rng: &mut R, items: &'a [String]) -> Option<&'a str> {
    if items.is_empty() {
        None
    } else {
        let idx = rng.gen_range(0..items.len());
        Some(items[idx].as_str())
    }
}

/// Convenience for embedders that don't need a custom `Observer`.
pub async fn bind_with_defaults(bind_addr: SocketAddr) -> Result<Gossiper, Error> {
    Gossiper::bind(bind_addr, GossipConfig::default(), Arc::new(NullObserver)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[tokio::test]
    async fn bind_rejects_wildcard_address() {
        let addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        let result = Gossiper::bind(addr, GossipConfig::default(), Arc::new(NullObserver)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_is_refused() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let gossiper =
            Gossiper::bind(addr, GossipConfig::default(), Arc::new(NullObserver)).await.unwrap();
        assert!(gossiper.delete("k").is_err());
    }

    #[tokio::test]
    async fn local_set_is_immediately_visible() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let gossiper =
            Gossiper::bind(addr, GossipConfig::default(), Arc::new(NullObserver)).await.unwrap();
        gossiper.set("x", Value::from(1));
        assert_eq!(gossiper.get("x"), Some(Value::from(1)));
        assert!(gossiper.contains("x"));
        assert_eq!(gossiper.len(), 1);
    }

    #[tokio::test]
    async fn s1_two_peer_handshake_over_real_udp() {
        let a = Gossiper::bind(
            "127.0.0.1:0".parse().unwrap(),
            GossipConfig::default(),
            Arc::new(NullObserver),
        )
        .await
        .unwrap();
        let b = Gossiper::bind(
            "127.0.0.1:0".parse().unwrap(),
            GossipConfig::default(),
            Arc::new(NullObserver),
        )
        .await
        .unwrap();

        a.set("x", Value::from(1));
        b.set("y", Value::from(2));
        a.seed([b.name()]).unwrap();
        b.seed([a.name()]).unwrap();

        let a_task = tokio::spawn({
            let a = a.clone();
            async move { a.run_with_rng(StepRng::new(0, 1)).await }
        });
        let b_task = tokio::spawn({
            let b = b.clone();
            async move { b.run_with_rng(StepRng::new(0, 1)).await }
        });

        // Give the select loops a handful of timer ticks to complete a
        // full request/first-response/second-response round trip.
        time::sleep(Duration::from_millis(300)).await;
        a_task.abort();
        b_task.abort();

        let b_view = b.view.lock();
        assert_eq!(b_view.get(a.name()).and_then(|p| p.get("x")), Some(&Value::from(1)));
        drop(b_view);
        let a_view = a.view.lock();
        assert_eq!(a_view.get(b.name()).and_then(|p| p.get("y")), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn s5_dead_partner_rediscovery_probability() {
        // spec.md §8 S5: with one live and one dead peer, a dead partner is
        // chosen with probability dead/(live+1) = 1/2; empirically 0.45-0.55
        // over 1000 rounds.
        let g = Gossiper::bind(
            "127.0.0.1:0".parse().unwrap(),
            GossipConfig::default(),
            Arc::new(NullObserver),
        )
        .await
        .unwrap();

        let live_peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let dead_peer: SocketAddr = "127.0.0.1:2".parse().unwrap();
        {
            let mut view = g.view.lock();
            view.ensure_peer(&live_peer.to_string());
            view.get_mut(&live_peer.to_string()).unwrap().update_with_delta(
                crate::state::HEARTBEAT_KEY,
                Value::from(1),
                1,
                0.0,
                &NullObserver,
            );
            view.get_mut(&live_peer.to_string()).unwrap().check_suspected(0.1, &NullObserver);
            view.ensure_peer(&dead_peer.to_string());
            // Never given a heartbeat, so it stays suspected/dead.
        }

        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut dead_chosen = 0u32;
        const ROUNDS: u32 = 1000;
        for _ in 0..ROUNDS {
            let (live, dead) = {
                let view = g.view.lock();
                let live: Vec<String> = view
                    .iter()
                    .filter(|(n, p)| n.as_str() != g.name() && p.is_alive())
                    .map(|(n, _)| n.clone())
                    .collect();
                let dead: Vec<String> = view
                    .iter()
                    .filter(|(n, p)| n.as_str() != g.name() && !p.is_alive())
                    .map(|(n, _)| n.clone())
                    .collect();
                (live, dead)
            };
            let probability = dead.len() as f64 / (live.len() + 1) as f64;
            if rng.gen::<f64>() < probability {
                dead_chosen += 1;
            }
        }

        let frequency = dead_chosen as f64 / ROUNDS as f64;
        assert!(
            (0.40..=0.60).contains(&frequency),
            "dead-partner selection frequency {frequency} drifted too far from 0.5"
        );
    }
}
