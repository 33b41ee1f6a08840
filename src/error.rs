//! Error taxonomy (spec.md §7): configuration, transport, protocol, and
//! local-write errors, each with a distinct recovery story.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Fatal at startup: a wildcard bind address or an unparseable seed/peer
    /// name. The caller is expected to abort rather than retry.
    #[error("configuration error: {0}")]
    Config(String),

    /// Send failure, oversized datagram, or any I/O-level transport fault.
    /// Logged and discarded by the gossip loop; never penalizes a peer
    /// beyond what the failure detector would do anyway.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// A datagram that decoded but didn't match the wire protocol (missing
    /// fields, unknown `type`). Dropped silently by the loop; surfaced here
    /// only so callers inspecting logs can tell transport faults from
    /// protocol faults.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The embedder's map interface does not support deletion (spec.md §6,
    /// §8 S6).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}
