//! UDP Broadcast Discovery
//!
//! Enables automatic peer discovery within the same network subnet. Each
//! peer broadcasts a small JSON announcement of its control endpoint and
//! listens for announcements from others, feeding the peer registry. Peers
//! that fall silent are pruned on the listener's idle ticks.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::protocol::Announcement;
use crate::state::PeerRegistry;

/// UDP broadcast discovery for automatic peer detection
pub struct Discovery {
    /// Announcement of this peer's control endpoint
    announcement: Announcement,
    /// UDP port announcements travel on
    port: u16,
    /// Interval between announcements
    interval: Duration,
    /// Registry to populate with discovered peers
    registry: Arc<PeerRegistry>,
}

impl Discovery {
    /// Create a new discovery instance for the registry's local endpoint
    pub fn new(registry: Arc<PeerRegistry>, config: &DiscoveryConfig) -> Self {
        Self {
            announcement: Announcement::new(registry.local_addr()),
            port: config.port,
            interval: Duration::from_secs(config.announce_interval_secs),
            registry,
        }
    }

    /// Start the announcer and listener tasks
    pub async fn start(&self) -> Result<(JoinHandle<()>, JoinHandle<()>)> {
        let broadcast_socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::Network(format!("Failed to bind broadcast socket: {}", e)))?;
        broadcast_socket
            .set_broadcast(true)
            .map_err(|e| Error::Network(format!("Failed to enable broadcast: {}", e)))?;

        let listen_socket = UdpSocket::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| {
                Error::Network(format!(
                    "Failed to bind discovery listener on port {}: {}",
                    self.port, e
                ))
            })?;

        let announcer = self.spawn_announcer(broadcast_socket);
        let listener = self.spawn_listener(listen_socket);

        tracing::info!("Discovery started on UDP port {}", self.port);
        Ok((announcer, listener))
    }

    /// Broadcast our announcement every interval tick. Send failures are
    /// not fatal; the next tick retries.
    fn spawn_announcer(&self, socket: UdpSocket) -> JoinHandle<()> {
        let announcement = self.announcement;
        let broadcast_addr = SocketAddr::from((Ipv4Addr::BROADCAST, self.port));
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                let message = match serde_json::to_string(&announcement) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::error!("Failed to encode announcement: {}", e);
                        continue;
                    }
                };

                match socket.send_to(message.as_bytes(), broadcast_addr).await {
                    Ok(_) => tracing::trace!("Announcement broadcast sent"),
                    Err(e) => tracing::trace!(
                        "Broadcast send failed (network may not support broadcast): {}",
                        e
                    ),
                }
            }
        })
    }

    /// Receive announcements and feed the registry; prune stale peers on
    /// idle ticks.
    fn spawn_listener(&self, socket: UdpSocket) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let mut buf = [0u8; 512];

            loop {
                match timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await {
                    Ok(Ok((len, src))) => {
                        let announcement = match parse_announcement(&buf[..len]) {
                            Some(a) => a,
                            None => {
                                tracing::debug!("Dropping malformed announcement from {}", src);
                                continue;
                            }
                        };

                        if registry.observe(announcement.addr()).await {
                            tracing::info!(
                                "Discovered peer {} (announced from {})",
                                announcement.addr(),
                                src
                            );
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::trace!("Discovery recv error: {}", e);
                    }
                    Err(_) => {
                        for addr in registry.prune_stale().await {
                            tracing::info!("Dropping stale peer {}", addr);
                        }
                    }
                }
            }
        })
    }
}

/// Parse an announcement datagram; anything malformed is None
fn parse_announcement(buf: &[u8]) -> Option<Announcement> {
    let text = std::str::from_utf8(buf).ok()?;
    serde_json::from_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announcement() {
        let parsed = parse_announcement(br#"{"ip":"192.168.1.7","port":6000}"#).unwrap();
        assert_eq!(parsed.addr(), "192.168.1.7:6000".parse().unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_announcement(b"").is_none());
        assert!(parse_announcement(b"hello").is_none());
        assert!(parse_announcement(&[0xff, 0xfe, 0x00]).is_none());
        assert!(parse_announcement(br#"{"ip":"not-an-ip","port":6000}"#).is_none());
        assert!(parse_announcement(br#"{"port":6000}"#).is_none());
    }

    #[tokio::test]
    async fn test_listener_never_registers_self() {
        let local: SocketAddr = "192.168.1.7:6000".parse().unwrap();
        let registry = Arc::new(PeerRegistry::new(local, Duration::from_secs(15)));

        // The registry filter is what keeps our own broadcasts out
        let own = Announcement::new(local);
        assert!(!registry.observe(own.addr()).await);
        assert!(registry.is_empty().await);
    }
}
