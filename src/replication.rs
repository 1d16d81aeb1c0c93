//! Snapshot Replication
//!
//! Pushes the full document snapshot to every known peer after a local
//! mutation. Replication is a best-effort broadcast, not a confirmed
//! multicast: a peer that cannot be reached this round simply stays on its
//! old copy until the next push or its own pull.

use std::sync::Arc;

use futures::future::join_all;

use crate::network::NetworkClient;
use crate::snapshot::SnapshotStore;
use crate::state::PeerRegistry;

/// Replicates the local snapshot to the rest of the peer set
pub struct Replicator {
    registry: Arc<PeerRegistry>,
    store: Arc<SnapshotStore>,
    client: Arc<NetworkClient>,
}

impl Replicator {
    /// Create a new replicator
    pub fn new(
        registry: Arc<PeerRegistry>,
        store: Arc<SnapshotStore>,
        client: Arc<NetworkClient>,
    ) -> Self {
        Self {
            registry,
            store,
            client,
        }
    }

    /// Push the current snapshot to every known peer concurrently.
    /// Returns how many peers acknowledged the update.
    pub async fn propagate_snapshot(&self) -> usize {
        let data = self.store.bytes().await;
        let peers = self.registry.peers().await;
        if peers.is_empty() {
            return 0;
        }

        let pushes = peers.iter().map(|&addr| {
            let data = &data;
            async move {
                match self.client.push_snapshot(addr, data).await {
                    Ok(()) => {
                        tracing::debug!("Replicated {} byte snapshot to {}", data.len(), addr);
                        true
                    }
                    Err(e) => {
                        tracing::warn!("Failed to replicate snapshot to {}: {}", addr, e);
                        false
                    }
                }
            }
        });

        let updated = join_all(pushes).await.into_iter().filter(|ok| *ok).count();
        tracing::info!("Snapshot propagated to {} of {} peers", updated, peers.len());
        updated
    }

    /// Apply a snapshot pushed by a peer: overwrite the local copy
    /// unconditionally, last writer wins
    pub async fn apply_remote(&self, data: Vec<u8>) {
        let len = data.len();
        if let Err(e) = self.store.replace(data).await {
            tracing::error!("Failed to persist replicated snapshot: {}", e);
        } else {
            tracing::debug!("Applied {} byte snapshot from peer", len);
        }
    }
}
