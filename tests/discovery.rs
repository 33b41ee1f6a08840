//! End-to-end scenarios that need real UDP sockets and real timers, as
//! opposed to the synchronous unit tests embedded in `src/`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::mock::StepRng;
use scuttle_gossip::{GossipConfig, Gossiper, NullObserver, Observer, PeerState};
use serde_json::Value;

fn fast_config() -> GossipConfig {
    GossipConfig {
        heartbeat_interval_secs: 0.02,
        gossip_interval_secs: 0.02,
        ..GossipConfig::default()
    }
}

async fn bind(cfg: GossipConfig, observer: Arc<dyn Observer>) -> Gossiper {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Gossiper::bind(addr, cfg, observer).await.unwrap()
}

/// Records every `(peer, key, value)` triple an observer is told about, so
/// a test can assert what a gossiper learned about a remote peer without
/// reaching past the embedder-facing notification API.
#[derive(Default)]
struct RecordingObserver {
    seen: Mutex<Vec<(String, String, Value)>>,
}

impl Observer for RecordingObserver {
    fn value_changed(&self, peer: &PeerState, key: &str, value: &Value) {
        self.seen
            .lock()
            .unwrap()
            .push((peer.name().to_string(), key.to_string(), value.clone()));
    }
}

/// spec.md §8 S4: A only knows B, B only knows C; after a few rounds A
/// should learn of C's name and attributes transitively through B.
#[tokio::test]
async fn s4_discovery_via_transitive_gossip() {
    let a_observer = Arc::new(RecordingObserver::default());
    let a = bind(fast_config(), a_observer.clone()).await;
    let b = bind(fast_config(), Arc::new(NullObserver)).await;
    let c = bind(fast_config(), Arc::new(NullObserver)).await;

    c.set("flavor", Value::from("transitive"));

    a.seed([b.name()]).unwrap();
    b.seed([a.name(), c.name()]).unwrap();
    c.seed([b.name()]).unwrap();

    let tasks: Vec<_> = [a.clone(), b.clone(), c.clone()]
        .into_iter()
        .map(|g| tokio::spawn(async move { g.run_with_rng(StepRng::new(0, 1)).await }))
        .collect();

    tokio::time::sleep(Duration::from_millis(500)).await;
    for t in tasks {
        t.abort();
    }

    let seen = a_observer.seen.lock().unwrap();
    assert!(
        seen.iter()
            .any(|(peer, key, value)| peer == c.name() && key == "flavor" && *value == Value::from("transitive")),
        "A never learned C's attributes transitively through B: {seen:?}"
    );
}

/// spec.md §8 S6: deleting through the embedder-facing map interface is
/// always refused, and never mutates the underlying attribute.
#[tokio::test]
async fn s6_delete_is_refused_and_value_survives() {
    let g = bind(GossipConfig::default(), Arc::new(NullObserver)).await;
    g.set("k", Value::from("v"));
    assert!(g.delete("k").is_err());
    assert_eq!(g.get("k"), Some(Value::from("v")));
}
