//! Shared State
//!
//! Mutex-guarded structures owned by the node: the peer registry and the
//! global lease record.

pub mod lease;
pub mod registry;

pub use lease::{LeaseRecord, LeaseState};
pub use registry::PeerRegistry;
