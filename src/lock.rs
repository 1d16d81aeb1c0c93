//! Lock Coordinator
//!
//! Manages the single global mutual-exclusion lease. Acquisition polls
//! every known peer and requires a strict majority of the known membership
//! (self included) to answer OK; a single DENIED kills the request. Lease
//! state changes propagate one hop, driven by the originator, and a
//! background timer reclaims leases whose holder crashed without
//! releasing.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::network::NetworkClient;
use crate::protocol::{Message, Response, Status};
use crate::state::{LeaseRecord, LeaseState, PeerRegistry};

/// Coordinator for the global mutual-exclusion lease
pub struct LockCoordinator {
    registry: Arc<PeerRegistry>,
    lease: Arc<LeaseState>,
    client: Arc<NetworkClient>,
    cleanup_interval: Duration,
}

impl LockCoordinator {
    /// Create a new coordinator
    pub fn new(
        registry: Arc<PeerRegistry>,
        lease: Arc<LeaseState>,
        client: Arc<NetworkClient>,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            registry,
            lease,
            client,
            cleanup_interval,
        }
    }

    /// Try to take the global lease.
    ///
    /// Fails with `LeaseDenied` if any responding peer (or our own record)
    /// says the lease is taken, and with `QuorumNotReached` when fewer
    /// than a majority of the known membership answered OK. On success the
    /// new record is persisted locally and propagated to every peer.
    pub async fn request_lease(&self) -> Result<()> {
        if !self.lease.is_free().await {
            let holder = self
                .lease
                .current()
                .await
                .map(|r| r.holder.to_string())
                .unwrap_or_else(|| "unknown".into());
            return Err(Error::LeaseDenied(holder));
        }

        let peers = self.registry.peers().await;
        let required = self.registry.quorum_size().await;
        let responses = self.client.collect(&peers, Message::LockRequest).await;

        // Our own vote counts toward the majority
        let mut reached = 1;
        for (addr, response) in &responses {
            match response {
                Response::Status { status: Status::Ok } => reached += 1,
                Response::Status { status: Status::Denied } => {
                    tracing::debug!("Lease request denied by {}", addr);
                    return Err(Error::LeaseDenied(addr.to_string()));
                }
                other => {
                    tracing::debug!("Ignoring unexpected vote from {}: {:?}", addr, other);
                }
            }
        }

        if reached < required {
            tracing::debug!(
                "Lease request failed: {} of {} votes ({} peers known)",
                reached,
                required,
                peers.len()
            );
            return Err(Error::QuorumNotReached { reached, required });
        }

        let record = LeaseRecord::held_by(self.registry.local_addr());
        self.lease.set(Some(record.clone())).await?;
        tracing::info!("Acquired global lease");

        propagate(&self.registry, &self.client, Some(record)).await;
        Ok(())
    }

    /// Refresh a lease we already hold, pushing the new acquisition time
    /// out to every peer
    pub async fn renew_lease(&self) -> Result<()> {
        if !self.lease.holds(self.registry.local_addr()).await {
            return Err(Error::LeaseDenied("lease not held locally".into()));
        }

        let record = LeaseRecord::held_by(self.registry.local_addr());
        self.lease.set(Some(record.clone())).await?;
        propagate(&self.registry, &self.client, Some(record)).await;
        Ok(())
    }

    /// Release a locally held lease and propagate the empty state.
    /// Releasing a lease we do not hold is a no-op.
    pub async fn release_lease(&self) -> Result<()> {
        if !self.lease.holds(self.registry.local_addr()).await {
            return Ok(());
        }

        self.lease.set(None).await?;
        tracing::info!("Released global lease");

        propagate(&self.registry, &self.client, None).await;
        Ok(())
    }

    /// Whether this node currently holds a live lease
    pub async fn holds_lease(&self) -> bool {
        self.lease.holds(self.registry.local_addr()).await
    }

    /// The lease record as this node last saw it
    pub async fn current_lease(&self) -> Option<LeaseRecord> {
        self.lease.current().await
    }

    /// Vote on a remote acquisition: OK only while our record is free
    pub async fn vote(&self) -> bool {
        self.lease.is_free().await
    }

    /// Apply a propagated lease update: overwrite unconditionally, no
    /// re-propagation
    pub async fn apply_update(&self, lock: Option<LeaseRecord>) {
        match &lock {
            Some(record) => tracing::debug!("Lease update: held by {}", record.holder),
            None => tracing::debug!("Lease update: released"),
        }
        if let Err(e) = self.lease.set(lock).await {
            tracing::warn!("Failed to persist lease update: {}", e);
        }
    }

    /// Spawn the background task that reclaims leases whose holder crashed
    /// without releasing
    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let lease = Arc::clone(&self.lease);
        let client = Arc::clone(&self.client);
        let interval = self.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match lease.expire_stale().await {
                    Ok(true) => propagate(&registry, &client, None).await,
                    Ok(false) => {}
                    Err(e) => tracing::warn!("Lease cleanup failed: {}", e),
                }
            }
        })
    }
}

/// Push a lease state to every known peer, best effort
async fn propagate(registry: &PeerRegistry, client: &NetworkClient, lock: Option<LeaseRecord>) {
    let peers = registry.peers().await;
    if peers.is_empty() {
        return;
    }

    let responses = client.collect(&peers, Message::LockUpdate { lock }).await;
    tracing::debug!(
        "Lease state propagated to {} of {} peers",
        responses.len(),
        peers.len()
    );
}
