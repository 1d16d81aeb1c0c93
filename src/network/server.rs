//! Network Server
//!
//! TCP accept loop for control connections from other peers. Each
//! connection carries a single request: a control message, optionally
//! followed by a snapshot transfer, answered with a single JSON reply.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};

use super::{read_json, recv_blob, send_blob, write_json};
use crate::error::Result;
use crate::protocol::{Message, Response, Status};
use crate::state::LeaseRecord;

/// Callbacks the server dispatches decoded messages to
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Vote on a remote lease acquisition; true answers OK
    async fn on_lock_request(&self, from: SocketAddr) -> bool;

    /// Overwrite the local lease state with a propagated record
    async fn on_lock_update(&self, lock: Option<LeaseRecord>);

    /// Answer a start-time query with our endpoint IP and start time
    async fn on_start_time_query(&self) -> (std::net::IpAddr, i64);

    /// A full snapshot arrived from a peer
    async fn on_snapshot_received(&self, data: Vec<u8>);

    /// Current snapshot bytes, for serving pulls
    async fn snapshot_bytes(&self) -> Vec<u8>;
}

/// Network server for peer control connections
pub struct NetworkServer {
    listener: TcpListener,
    handler: Arc<dyn MessageHandler>,
}

impl NetworkServer {
    /// Bind the control listener
    pub async fn bind(bind_address: &str, handler: Arc<dyn MessageHandler>) -> Result<Self> {
        let listener = TcpListener::bind(bind_address).await?;
        tracing::info!("Control server listening on {}", listener.local_addr()?);
        Ok(Self { listener, handler })
    }

    /// The bound address (useful when binding to port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve connections until the process exits
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, addr, handler).await {
                            tracing::warn!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Serve a single request on a fresh connection
async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    handler: Arc<dyn MessageHandler>,
) -> Result<()> {
    socket.set_nodelay(true)?;
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    // Malformed messages end the connection here with no reply
    let message: Message = read_json(&mut reader).await?;
    tracing::trace!("Received {} from {}", message.type_name(), addr);

    match message {
        Message::LockRequest => {
            let status = if handler.on_lock_request(addr).await {
                Status::Ok
            } else {
                Status::Denied
            };
            write_json(&mut writer, &Response::Status { status }).await?;
        }
        Message::LockUpdate { lock } => {
            handler.on_lock_update(lock).await;
            write_json(&mut writer, &Response::Status { status: Status::LocksUpdated }).await?;
        }
        Message::NodeStartTime { .. } => {
            let (ip, timestamp) = handler.on_start_time_query().await;
            write_json(&mut writer, &Response::StartTime { ip, timestamp }).await?;
        }
        Message::FilesystemUpdate => {
            let data = recv_blob(&mut reader, &mut writer).await?;
            handler.on_snapshot_received(data).await;
            write_json(&mut writer, &Response::Status { status: Status::Updated }).await?;
        }
        Message::FilesystemRequest => {
            let data = handler.snapshot_bytes().await;
            send_blob(&mut reader, &mut writer, &data).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingHandler {
        grant: bool,
        snapshot: Vec<u8>,
        received: Mutex<Option<Vec<u8>>>,
        lease: Mutex<Option<Option<LeaseRecord>>>,
    }

    #[async_trait::async_trait]
    impl MessageHandler for RecordingHandler {
        async fn on_lock_request(&self, _from: SocketAddr) -> bool {
            self.grant
        }

        async fn on_lock_update(&self, lock: Option<LeaseRecord>) {
            *self.lease.lock().unwrap() = Some(lock);
        }

        async fn on_start_time_query(&self) -> (std::net::IpAddr, i64) {
            ("127.0.0.1".parse().unwrap(), 7777)
        }

        async fn on_snapshot_received(&self, data: Vec<u8>) {
            *self.received.lock().unwrap() = Some(data);
        }

        async fn snapshot_bytes(&self) -> Vec<u8> {
            self.snapshot.clone()
        }
    }

    async fn start_server(handler: Arc<RecordingHandler>) -> SocketAddr {
        let server = NetworkServer::bind("127.0.0.1:0", handler).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    async fn roundtrip(addr: SocketAddr, message: &Message) -> Response {
        let socket = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);
        write_json(&mut writer, message).await.unwrap();
        read_json(&mut reader).await.unwrap()
    }

    #[tokio::test]
    async fn test_lock_request_votes() {
        let handler = Arc::new(RecordingHandler {
            grant: true,
            snapshot: Vec::new(),
            received: Mutex::new(None),
            lease: Mutex::new(None),
        });
        let addr = start_server(Arc::clone(&handler)).await;

        let resp = roundtrip(addr, &Message::LockRequest).await;
        assert!(matches!(resp, Response::Status { status: Status::Ok }));

        let resp = roundtrip(addr, &Message::NodeStartTime { timestamp: 1 }).await;
        match resp {
            Response::StartTime { timestamp, .. } => assert_eq!(timestamp, 7777),
            other => panic!("wrong response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_snapshot_push_and_pull() {
        let handler = Arc::new(RecordingHandler {
            grant: false,
            snapshot: b"served-snapshot".to_vec(),
            received: Mutex::new(None),
            lease: Mutex::new(None),
        });
        let addr = start_server(Arc::clone(&handler)).await;

        // Push: notice, transfer, UPDATED reply
        let socket = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);
        write_json(&mut writer, &Message::FilesystemUpdate).await.unwrap();
        send_blob(&mut reader, &mut writer, b"pushed-snapshot").await.unwrap();
        let resp: Response = read_json(&mut reader).await.unwrap();
        assert!(matches!(resp, Response::Status { status: Status::Updated }));
        assert_eq!(
            handler.received.lock().unwrap().as_deref(),
            Some(b"pushed-snapshot".as_slice())
        );

        // Pull: request answered by the transfer itself
        let socket = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);
        write_json(&mut writer, &Message::FilesystemRequest).await.unwrap();
        let data = recv_blob(&mut reader, &mut writer).await.unwrap();
        assert_eq!(data, b"served-snapshot");
    }

    #[tokio::test]
    async fn test_malformed_message_gets_no_reply() {
        let handler = Arc::new(RecordingHandler {
            grant: true,
            snapshot: Vec::new(),
            received: Mutex::new(None),
            lease: Mutex::new(None),
        });
        let addr = start_server(handler).await;

        let socket = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);
        tokio::io::AsyncWriteExt::write_all(&mut writer, b"this is not json\n")
            .await
            .unwrap();

        // The server drops the connection without replying
        let result: Result<Response> = read_json(&mut reader).await;
        assert!(result.is_err());
    }
}
