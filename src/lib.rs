//! FlockFS - Coordination Substrate for a Replicated Shared Document
//!
//! FlockFS lets an ad hoc set of independently started peers discover one
//! another on a local network, agree on which single peer may mutate a
//! shared document at a time, and converge on an identical copy of that
//! document after any mutation. It is the substrate underneath a
//! file-system-like service exposed concurrently by several peers.
//!
//! # Architecture
//!
//! Each process runs one [`node::Node`] owning three pieces of shared
//! state: the peer registry fed by UDP broadcast discovery, the global
//! lease record guarding mutations, and the opaque document snapshot.
//! After a local mutation the full snapshot is pushed to every known peer;
//! a freshly started peer pulls the authoritative snapshot from the oldest
//! reachable peer before serving.
//!
//! # Features
//!
//! - UDP broadcast discovery with stale-peer pruning
//! - Majority-quorum lease acquisition with automatic expiry
//! - Best-effort full-snapshot replication, last writer wins
//! - Oldest-peer bootstrap synchronization
//! - Read-only HTTP status API

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod discovery;
pub mod error;
pub mod lock;
pub mod network;
pub mod node;
pub mod protocol;
pub mod replication;
pub mod snapshot;
pub mod state;

pub use config::FlockConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::FlockConfig;
    pub use crate::error::{Error, Result};
    pub use crate::node::{Node, NodeStatus};
    pub use crate::protocol::{Message, Response, Status};
    pub use crate::state::{LeaseRecord, PeerRegistry};
}
