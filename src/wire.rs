//! Wire protocol (spec.md §6): one JSON object per datagram, three message
//! shapes, and the `HOST:PORT` name format.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::state::Version;

/// name → highest version seen, the compact summary exchanged to kick off
/// reconciliation.
pub type Digest = HashMap<String, Version>;

/// name → ordered list of (key, value, version) triples, MUST be sorted by
/// ascending version per peer (spec.md §6).
pub type Deltas = HashMap<String, Vec<(String, Value, Version)>>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    #[serde(rename = "request")]
    Request { digest: Digest },

    #[serde(rename = "first-response")]
    FirstResponse { digest: Digest, updates: Deltas },

    #[serde(rename = "second-response")]
    SecondResponse { updates: Deltas },
}

impl WireMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Decodes a datagram. A malformed payload or an unrecognized `type`
    /// both surface as `Error::Protocol`; the caller (the gossip loop) is
    /// expected to log and drop rather than propagate (spec.md §7).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Protocol(e.to_string()))
    }
}

/// Parses and validates a `HOST:PORT` peer name. Used both for seed names
/// supplied by the embedder and for the name the gossiper derives from its
/// own bound socket address.
pub fn parse_peer_name(name: &str) -> Result<String, Error> {
    let (host, port) = name
        .rsplit_once(':')
        .ok_or_else(|| Error::Config(format!("peer name '{name}' is not HOST:PORT")))?;

    if host.is_empty() {
        return Err(Error::Config(format!("peer name '{name}' has an empty host")));
    }
    port.parse::<u16>()
        .map_err(|_| Error::Config(format!("peer name '{name}' has an invalid port")))?;

    Ok(name.to_string())
}

/// Derives the canonical `HOST:PORT` name for a bound socket address,
/// rejecting the `0.0.0.0` wildcard (spec.md §4.4: "a wildcard bind ... is an
/// error; the caller must supply a concrete bind address").
pub fn name_from_bind_addr(addr: SocketAddr) -> Result<String, Error> {
    if addr.ip().is_unspecified() {
        return Err(Error::Config(format!(
            "cannot derive a peer name from wildcard bind address {addr}"
        )));
    }
    Ok(format!("{}:{}", addr.ip(), addr.port()))
}
