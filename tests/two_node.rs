//! Two-peer cluster scenarios exercised over real sockets: startup sync
//! from the oldest peer, snapshot propagation, and lease mutual exclusion.

use std::net::SocketAddr;
use std::time::Duration;

use flockfs::config::FlockConfig;
use flockfs::node::Node;

/// Reserve a loopback port for a peer's control endpoint
fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn peer_config(
    id: &str,
    addr: SocketAddr,
    seeds: &[SocketAddr],
    dir: &tempfile::TempDir,
    expiration_secs: u64,
) -> FlockConfig {
    let seeds = seeds
        .iter()
        .map(|s| format!("\"{}\"", s))
        .collect::<Vec<_>>()
        .join(", ");

    FlockConfig::from_str(&format!(
        r#"
[node]
id = "{id}"
bind_address = "{addr}"
data_dir = "{dir}"

[discovery]
enabled = false
startup_grace_secs = 0
seed_peers = [{seeds}]

[lease]
cleanup_interval_secs = 1
expiration_secs = {expiration_secs}

[network]
connect_timeout_secs = 1
request_timeout_secs = 5

[api]
enabled = false
"#,
        id = id,
        addr = addr,
        dir = dir.path().display(),
        seeds = seeds,
        expiration_secs = expiration_secs,
    ))
    .unwrap()
}

#[tokio::test]
async fn two_peer_bootstrap_replication_and_lease() {
    let addr_b = free_addr();
    let addr_a = free_addr();
    let dir_b = tempfile::tempdir().unwrap();
    let dir_a = tempfile::tempdir().unwrap();

    // B starts first and is therefore the oldest peer
    let node_b = Node::new(peer_config("peer-b", addr_b, &[addr_a], &dir_b, 300)).unwrap();
    node_b.start().await.unwrap();

    // B writes the initial document; the push to the absent A is swallowed
    assert_eq!(node_b.commit_snapshot(b"genesis".to_vec()).await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;

    // A joins and pulls the authoritative snapshot from B
    let node_a = Node::new(peer_config("peer-a", addr_a, &[addr_b], &dir_a, 300)).unwrap();
    node_a.start().await.unwrap();
    assert_eq!(node_a.snapshot().await, b"genesis");

    // A takes the lease; B is polled and votes OK
    node_a.request_lease().await.unwrap();
    assert!(node_a.holds_lease().await);

    // B's own attempt is denied while A holds
    assert!(node_b.request_lease().await.is_err());
    assert!(!node_b.holds_lease().await);

    // A mutates and propagates; B converges on the identical bytes
    let updated = node_a
        .commit_snapshot(b"post-mutation".to_vec())
        .await
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(node_b.snapshot().await, b"post-mutation");
    assert_eq!(node_a.snapshot().await, node_b.snapshot().await);

    // Once A releases, B can acquire
    node_a.release_lease().await.unwrap();
    node_b.request_lease().await.unwrap();
    assert!(node_b.holds_lease().await);
    node_b.release_lease().await.unwrap();
}

#[tokio::test]
async fn lease_can_move_after_holder_goes_quiet() {
    let addr_a = free_addr();
    let addr_b = free_addr();
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let node_a = Node::new(peer_config("peer-a", addr_a, &[addr_b], &dir_a, 1)).unwrap();
    node_a.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let node_b = Node::new(peer_config("peer-b", addr_b, &[addr_a], &dir_b, 1)).unwrap();
    node_b.start().await.unwrap();

    node_a.request_lease().await.unwrap();
    assert!(node_b.request_lease().await.is_err());

    // The holder never releases; the expiration window passes and the
    // cleanup timers reclaim the lease on both sides
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!node_a.holds_lease().await);

    node_b.request_lease().await.unwrap();
    assert!(node_b.holds_lease().await);
}
