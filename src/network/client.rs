//! Network Client
//!
//! Point-to-point TCP client for peer control connections. Every operation
//! runs under a bounded timeout so one unreachable peer cannot stall a
//! broadcast round; per-peer failures surface as errors the caller may
//! swallow.

use std::net::SocketAddr;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{read_json, recv_blob, send_blob, write_json};
use crate::error::{Error, Result};
use crate::protocol::{Message, Response, Status};

/// Network client for connecting to peer nodes
pub struct NetworkClient {
    /// Connection timeout
    connect_timeout: Duration,
    /// Per-request timeout (covers snapshot transfers)
    request_timeout: Duration,
}

impl NetworkClient {
    /// Create a new network client
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    /// Send a control message to a peer and wait for its JSON reply
    pub async fn request(&self, addr: SocketAddr, message: &Message) -> Result<Response> {
        match timeout(self.request_timeout, self.request_inner(addr, message)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionTimeout(addr.to_string())),
        }
    }

    async fn request_inner(&self, addr: SocketAddr, message: &Message) -> Result<Response> {
        let stream = self.connect(addr).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_json(&mut writer, message).await?;
        read_json(&mut reader).await
    }

    /// Send a control message to every peer concurrently, collecting the
    /// replies that arrived. Unreachable or non-responding peers are simply
    /// excluded from the result.
    pub async fn collect(
        &self,
        peers: &[SocketAddr],
        message: Message,
    ) -> Vec<(SocketAddr, Response)> {
        let requests = peers.iter().map(|&addr| {
            let message = message.clone();
            async move {
                match self.request(addr, &message).await {
                    Ok(response) => Some((addr, response)),
                    Err(e) => {
                        tracing::debug!(
                            "Peer {} excluded from this {} round: {}",
                            addr,
                            message.type_name(),
                            e
                        );
                        None
                    }
                }
            }
        });

        join_all(requests).await.into_iter().flatten().collect()
    }

    /// Push a snapshot to a single peer: the update notice followed by the
    /// transfer, expecting an UPDATED acknowledgment.
    pub async fn push_snapshot(&self, addr: SocketAddr, data: &[u8]) -> Result<()> {
        match timeout(self.request_timeout, self.push_snapshot_inner(addr, data)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionTimeout(addr.to_string())),
        }
    }

    async fn push_snapshot_inner(&self, addr: SocketAddr, data: &[u8]) -> Result<()> {
        let stream = self.connect(addr).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_json(&mut writer, &Message::FilesystemUpdate).await?;
        send_blob(&mut reader, &mut writer, data).await?;

        match read_json(&mut reader).await? {
            Response::Status { status: Status::Updated } => Ok(()),
            other => Err(Error::Protocol(format!(
                "unexpected reply to snapshot push: {:?}",
                other
            ))),
        }
    }

    /// Pull the full snapshot from a peer
    pub async fn pull_snapshot(&self, addr: SocketAddr) -> Result<Vec<u8>> {
        match timeout(self.request_timeout, self.pull_snapshot_inner(addr)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionTimeout(addr.to_string())),
        }
    }

    async fn pull_snapshot_inner(&self, addr: SocketAddr) -> Result<Vec<u8>> {
        let stream = self.connect(addr).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_json(&mut writer, &Message::FilesystemRequest).await?;
        recv_blob(&mut reader, &mut writer).await
    }

    /// Connect to an address
    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream> {
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(addr.to_string())),
        }
    }
}
