//! Startup Synchronization
//!
//! Gives a newly started peer a correct initial snapshot: after a short
//! discovery grace period, the peer with the earliest start time among all
//! reachable peers is elected, and unless that is us, the authoritative
//! snapshot is pulled from it. A failed pull degrades to whatever local
//! snapshot exists; the peer keeps running and converges on the next
//! propagated update.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::network::NetworkClient;
use crate::protocol::{Message, Response};
use crate::snapshot::SnapshotStore;
use crate::state::PeerRegistry;

/// One-shot startup synchronizer
pub struct Bootstrap {
    registry: Arc<PeerRegistry>,
    store: Arc<SnapshotStore>,
    client: Arc<NetworkClient>,
    grace: Duration,
}

impl Bootstrap {
    /// Create a new bootstrap sequencer
    pub fn new(
        registry: Arc<PeerRegistry>,
        store: Arc<SnapshotStore>,
        client: Arc<NetworkClient>,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            client,
            grace,
        }
    }

    /// Run the startup sync once. Only I/O errors persisting a pulled
    /// snapshot are returned; an unreachable oldest peer is logged and
    /// tolerated.
    pub async fn run(&self) -> Result<()> {
        // Give discovery a chance to populate the registry first
        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
        }

        let oldest = self.elect_oldest().await;
        if oldest == self.registry.local_addr() {
            tracing::info!("This peer is the oldest; local snapshot is authoritative");
            return Ok(());
        }

        tracing::info!("Pulling snapshot from oldest peer {}", oldest);
        match self.client.pull_snapshot(oldest).await {
            Ok(data) => {
                let len = data.len();
                self.store.replace(data).await?;
                tracing::info!("Startup sync complete ({} bytes)", len);
            }
            Err(e) => {
                // Correctness degrades, liveness does not: we may serve a
                // stale or empty snapshot until the next propagated update
                tracing::warn!(
                    "Startup sync from {} failed: {}; continuing with the local snapshot",
                    oldest,
                    e
                );
            }
        }

        Ok(())
    }

    /// Query every known peer for its start time and elect the oldest,
    /// ourselves included. Non-responders are excluded from the election.
    pub async fn elect_oldest(&self) -> SocketAddr {
        let peers = self.registry.peers().await;
        let query = Message::NodeStartTime {
            timestamp: self.registry.start_time_millis(),
        };
        let responses = self.client.collect(&peers, query).await;

        let mut candidates = vec![(self.registry.local_addr(), self.registry.start_time_millis())];
        for (addr, response) in responses {
            match response {
                Response::StartTime { timestamp, .. } => candidates.push((addr, timestamp)),
                other => {
                    tracing::debug!("Ignoring unexpected start-time reply from {}: {:?}", addr, other);
                }
            }
        }

        let (oldest, started) = pick_oldest(&candidates)
            .unwrap_or((self.registry.local_addr(), self.registry.start_time_millis()));
        tracing::debug!(
            "Oldest of {} reachable peers is {} (started {})",
            candidates.len(),
            oldest,
            started
        );
        oldest
    }
}

/// Minimum start time wins; ties break on address ordering so every peer
/// elects the same winner
fn pick_oldest(candidates: &[(SocketAddr, i64)]) -> Option<(SocketAddr, i64)> {
    candidates
        .iter()
        .copied()
        .min_by_key(|&(addr, timestamp)| (timestamp, addr))
}
