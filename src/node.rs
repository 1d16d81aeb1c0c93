//! Node Coordinator
//!
//! One `Node` per process. It owns the shared state (peer registry, lease
//! record, snapshot store), wires the background services together, and
//! exposes the narrow interface the file-access command layer consumes:
//! take the lease around a mutation, commit the new snapshot, propagate
//! it.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bootstrap::Bootstrap;
use crate::config::FlockConfig;
use crate::discovery::Discovery;
use crate::error::Result;
use crate::lock::LockCoordinator;
use crate::network::{MessageHandler, NetworkClient, NetworkServer};
use crate::replication::Replicator;
use crate::snapshot::SnapshotStore;
use crate::state::{LeaseRecord, LeaseState, PeerRegistry};

/// Point-in-time view of a node, served by the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: String,
    pub address: String,
    pub started_at: DateTime<Utc>,
    pub peers: Vec<String>,
    pub lease: Option<LeaseRecord>,
    pub holds_lease: bool,
    pub snapshot_bytes: usize,
    pub snapshot_updated_at: Option<DateTime<Utc>>,
}

/// Per-process coordinator for discovery, lease and replication
pub struct Node {
    config: FlockConfig,
    registry: Arc<PeerRegistry>,
    lock: Arc<LockCoordinator>,
    store: Arc<SnapshotStore>,
    replicator: Arc<Replicator>,
    client: Arc<NetworkClient>,
}

impl Node {
    /// Create a node from its configuration. Loads persisted snapshot and
    /// lease state from the data directory, creating it if needed.
    pub fn new(config: FlockConfig) -> Result<Arc<Self>> {
        std::fs::create_dir_all(config.data_dir())?;

        let local_addr = config.advertise_addr()?;
        let registry = Arc::new(PeerRegistry::new(local_addr, config.peer_stale_after()));
        let client = Arc::new(NetworkClient::new(
            config.connect_timeout(),
            config.request_timeout(),
        ));
        let store = Arc::new(SnapshotStore::open(config.snapshot_path())?);
        let lease = Arc::new(LeaseState::load(
            config.lease_path(),
            config.lease_expiration(),
        ));
        let lock = Arc::new(LockCoordinator::new(
            Arc::clone(&registry),
            lease,
            Arc::clone(&client),
            config.cleanup_interval(),
        ));
        let replicator = Arc::new(Replicator::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&client),
        ));

        Ok(Arc::new(Self {
            config,
            registry,
            lock,
            store,
            replicator,
            client,
        }))
    }

    /// Start every background service and run the startup sync.
    ///
    /// Binds the control server, starts discovery (when enabled), seeds
    /// any statically configured peers, spawns the lease cleanup timer,
    /// and finally pulls the snapshot from the oldest reachable peer.
    /// Returns once the local snapshot is as valid as it is going to get.
    pub async fn start(&self) -> Result<()> {
        let handler = Arc::new(NodeHandler {
            registry: Arc::clone(&self.registry),
            lock: Arc::clone(&self.lock),
            store: Arc::clone(&self.store),
            replicator: Arc::clone(&self.replicator),
        });
        let server = NetworkServer::bind(&self.config.node.bind_address, handler).await?;
        tokio::spawn(server.run());

        for addr in self.config.seed_peer_addrs() {
            if self.registry.observe(addr).await {
                tracing::info!("Seeded peer {}", addr);
            }
        }

        if self.config.discovery.enabled {
            let discovery = Discovery::new(Arc::clone(&self.registry), &self.config.discovery);
            let _ = discovery.start().await?;
        } else {
            tracing::info!("Discovery disabled; relying on seeded peers");
        }

        let _ = self.lock.spawn_cleanup();

        let bootstrap = Bootstrap::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            Arc::clone(&self.client),
            self.config.startup_grace(),
        );
        bootstrap.run().await?;

        tracing::info!(
            "Node {} up at {} with {} known peers",
            self.config.node.id,
            self.registry.local_addr(),
            self.registry.len().await
        );
        Ok(())
    }

    // ===== Interface consumed by the control/session layer =====

    /// Acquire the global lease before a mutating operation
    pub async fn request_lease(&self) -> Result<()> {
        self.lock.request_lease().await
    }

    /// Release the global lease after a mutating operation
    pub async fn release_lease(&self) -> Result<()> {
        self.lock.release_lease().await
    }

    /// Whether this node currently holds a live lease. A mutating
    /// operation must not start unless this is true.
    pub async fn holds_lease(&self) -> bool {
        self.lock.holds_lease().await
    }

    /// Persist a freshly mutated snapshot and push it to every peer.
    /// Returns how many peers acknowledged the update.
    pub async fn commit_snapshot(&self, data: Vec<u8>) -> Result<usize> {
        self.store.replace(data).await?;
        Ok(self.replicator.propagate_snapshot().await)
    }

    /// Current snapshot bytes
    pub async fn snapshot(&self) -> Vec<u8> {
        self.store.bytes().await
    }

    /// The peer registry
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Point-in-time status for the HTTP API
    pub async fn status(&self) -> NodeStatus {
        let peers = self.registry.peers().await;
        NodeStatus {
            id: self.config.node.id.clone(),
            address: self.registry.local_addr().to_string(),
            started_at: self.registry.start_time(),
            peers: peers.iter().map(|p| p.to_string()).collect(),
            lease: self.lock.current_lease().await,
            holds_lease: self.lock.holds_lease().await,
            snapshot_bytes: self.store.len().await,
            snapshot_updated_at: self.store.last_update().await,
        }
    }
}

/// Dispatch target for the control server: the slices of node state each
/// remote message touches
struct NodeHandler {
    registry: Arc<PeerRegistry>,
    lock: Arc<LockCoordinator>,
    store: Arc<SnapshotStore>,
    replicator: Arc<Replicator>,
}

#[async_trait::async_trait]
impl MessageHandler for NodeHandler {
    async fn on_lock_request(&self, from: SocketAddr) -> bool {
        let granted = self.lock.vote().await;
        tracing::debug!(
            "Lease vote for {}: {}",
            from,
            if granted { "OK" } else { "DENIED" }
        );
        granted
    }

    async fn on_lock_update(&self, lock: Option<LeaseRecord>) {
        self.lock.apply_update(lock).await;
    }

    async fn on_start_time_query(&self) -> (IpAddr, i64) {
        (
            self.registry.local_addr().ip(),
            self.registry.start_time_millis(),
        )
    }

    async fn on_snapshot_received(&self, data: Vec<u8>) {
        self.replicator.apply_remote(data).await;
    }

    async fn snapshot_bytes(&self) -> Vec<u8> {
        self.store.bytes().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> FlockConfig {
        FlockConfig::from_str(&format!(
            r#"
[node]
id = "test-node"
bind_address = "127.0.0.1:0"
advertise_address = "127.0.0.1:6000"
data_dir = "{}"

[discovery]
enabled = false
"#,
            dir.path().display()
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_status_reflects_state() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::new(test_config(&dir)).unwrap();

        let status = node.status().await;
        assert_eq!(status.id, "test-node");
        assert_eq!(status.address, "127.0.0.1:6000");
        assert!(status.peers.is_empty());
        assert!(status.lease.is_none());
        assert!(!status.holds_lease);
        assert_eq!(status.snapshot_bytes, 0);
    }

    #[tokio::test]
    async fn test_commit_persists_across_restart() {
        let dir = tempfile::tempdir().unwrap();

        let node = Node::new(test_config(&dir)).unwrap();
        node.commit_snapshot(b"durable".to_vec()).await.unwrap();
        drop(node);

        let node = Node::new(test_config(&dir)).unwrap();
        assert_eq!(node.snapshot().await, b"durable");
    }
}
