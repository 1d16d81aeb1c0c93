//! Peer Registry
//!
//! Soft-state membership: peers are added when their announcements arrive
//! and dropped again once they have been silent for the stale window.
//! The registry also carries this process's own start time, which the
//! startup sync uses for the oldest-peer election.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// In-memory set of known peer control endpoints
pub struct PeerRegistry {
    /// This peer's advertised control endpoint
    local_addr: SocketAddr,
    /// Process start time, fixed for the process lifetime
    start_time: DateTime<Utc>,
    /// Known peers and when each was last heard from
    peers: RwLock<HashMap<SocketAddr, Instant>>,
    /// Window after which a silent peer is dropped
    stale_after: Duration,
}

impl PeerRegistry {
    /// Create an empty registry for the given local endpoint
    pub fn new(local_addr: SocketAddr, stale_after: Duration) -> Self {
        Self {
            local_addr,
            start_time: Utc::now(),
            peers: RwLock::new(HashMap::new()),
            stale_after,
        }
    }

    /// This peer's advertised control endpoint
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Process start time
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Process start time in unix milliseconds (wire form)
    pub fn start_time_millis(&self) -> i64 {
        self.start_time.timestamp_millis()
    }

    /// Insert or refresh a peer. Announcements of our own endpoint are
    /// ignored. Returns true when the peer was not known before.
    pub async fn observe(&self, addr: SocketAddr) -> bool {
        if addr == self.local_addr {
            return false;
        }
        let mut peers = self.peers.write().await;
        peers.insert(addr, Instant::now()).is_none()
    }

    /// Get all known peer endpoints
    pub async fn peers(&self) -> Vec<SocketAddr> {
        self.peers.read().await.keys().copied().collect()
    }

    /// Number of known peers (excluding self)
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Whether any peers are known
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Drop peers that have been silent for longer than the stale window.
    /// Returns the dropped endpoints.
    pub async fn prune_stale(&self) -> Vec<SocketAddr> {
        let mut peers = self.peers.write().await;
        let stale_after = self.stale_after;
        let mut dropped = Vec::new();
        peers.retain(|addr, last_seen| {
            if last_seen.elapsed() > stale_after {
                dropped.push(*addr);
                false
            } else {
                true
            }
        });
        dropped
    }

    /// Majority quorum over the known membership, self included
    pub async fn quorum_size(&self) -> usize {
        let total = self.len().await + 1;
        (total / 2) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn registry() -> PeerRegistry {
        PeerRegistry::new(addr("10.0.0.1:6000"), Duration::from_secs(15))
    }

    #[tokio::test]
    async fn test_observe_and_refresh() {
        let reg = registry();

        assert!(reg.observe(addr("10.0.0.2:6000")).await);
        // Re-announcement is a refresh, not a new peer
        assert!(!reg.observe(addr("10.0.0.2:6000")).await);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_own_announcements_ignored() {
        let reg = registry();

        assert!(!reg.observe(addr("10.0.0.1:6000")).await);
        assert!(reg.is_empty().await);

        // Same host, different port is a distinct peer
        assert!(reg.observe(addr("10.0.0.1:6001")).await);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_prune_stale() {
        let reg = PeerRegistry::new(addr("10.0.0.1:6000"), Duration::from_millis(50));

        reg.observe(addr("10.0.0.2:6000")).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        reg.observe(addr("10.0.0.3:6000")).await;

        let dropped = reg.prune_stale().await;
        assert_eq!(dropped, vec![addr("10.0.0.2:6000")]);
        assert_eq!(reg.peers().await, vec![addr("10.0.0.3:6000")]);
    }

    #[tokio::test]
    async fn test_quorum_size() {
        let reg = registry();
        // Alone: quorum of one
        assert_eq!(reg.quorum_size().await, 1);

        reg.observe(addr("10.0.0.2:6000")).await;
        // Two members: both must agree
        assert_eq!(reg.quorum_size().await, 2);

        reg.observe(addr("10.0.0.3:6000")).await;
        // Three members: two of three
        assert_eq!(reg.quorum_size().await, 2);

        reg.observe(addr("10.0.0.4:6000")).await;
        assert_eq!(reg.quorum_size().await, 3);
    }
}
