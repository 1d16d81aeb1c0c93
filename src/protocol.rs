//! Wire Protocol
//!
//! Control messages exchanged between peers over point-to-point TCP
//! connections. Every message is a self-contained JSON object carrying a
//! `type` tag, newline-delimited on the wire; snapshot payloads follow the
//! control message on the same connection as a length-prefixed transfer.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::state::LeaseRecord;

/// Control messages for peer-to-peer communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Ask the receiver to vote on a lease acquisition
    #[serde(rename = "LOCK_REQUEST")]
    LockRequest,

    /// Overwrite the receiver's lease state (one-hop, originator-driven)
    #[serde(rename = "LOCK_UPDATE")]
    LockUpdate { lock: Option<LeaseRecord> },

    /// Query the receiver's process start time; carries the sender's own
    #[serde(rename = "NODE_START_TIME")]
    NodeStartTime { timestamp: i64 },

    /// A snapshot push follows on this connection
    #[serde(rename = "FILESYSTEM_UPDATE")]
    FilesystemUpdate,

    /// Ask the receiver to stream its snapshot back
    #[serde(rename = "FILESYSTEM_REQUEST")]
    FilesystemRequest,
}

impl Message {
    /// Get the message type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::LockRequest => "LOCK_REQUEST",
            Message::LockUpdate { .. } => "LOCK_UPDATE",
            Message::NodeStartTime { .. } => "NODE_START_TIME",
            Message::FilesystemUpdate => "FILESYSTEM_UPDATE",
            Message::FilesystemRequest => "FILESYSTEM_REQUEST",
        }
    }
}

/// Responses to control messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// Plain status reply
    Status { status: Status },

    /// Reply to a start-time query
    StartTime { ip: IpAddr, timestamp: i64 },
}

/// Status values carried in plain replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Vote in favour of a lease acquisition
    #[serde(rename = "OK")]
    Ok,
    /// Vote against a lease acquisition
    #[serde(rename = "DENIED")]
    Denied,
    /// Lease state overwritten
    #[serde(rename = "LOCKS_UPDATED")]
    LocksUpdated,
    /// Snapshot overwritten
    #[serde(rename = "UPDATED")]
    Updated,
}

/// Discovery broadcast message announcing a peer's control endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub ip: IpAddr,
    pub port: u16,
}

impl Announcement {
    /// Build an announcement for a control endpoint
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }

    /// The announced control endpoint
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_message_tags() {
        let json = serde_json::to_string(&Message::LockRequest).unwrap();
        assert_eq!(json, r#"{"type":"LOCK_REQUEST"}"#);

        let json = serde_json::to_string(&Message::NodeStartTime { timestamp: 42 }).unwrap();
        assert_eq!(json, r#"{"type":"NODE_START_TIME","timestamp":42}"#);
    }

    #[test]
    fn test_lock_update_roundtrip() {
        let record = LeaseRecord {
            holder: "10.0.0.5:6000".parse().unwrap(),
            acquired_at: Utc::now(),
        };
        let msg = Message::LockUpdate {
            lock: Some(record.clone()),
        };

        let json = serde_json::to_string(&msg).unwrap();
        match serde_json::from_str(&json).unwrap() {
            Message::LockUpdate { lock: Some(restored) } => {
                assert_eq!(restored.holder, record.holder);
                assert_eq!(restored.acquired_at, record.acquired_at);
            }
            other => panic!("wrong message: {:?}", other),
        }

        // An empty lease state serializes as an explicit null
        let json = serde_json::to_string(&Message::LockUpdate { lock: None }).unwrap();
        assert_eq!(json, r#"{"type":"LOCK_UPDATE","lock":null}"#);
    }

    #[test]
    fn test_response_roundtrip() {
        let json = serde_json::to_string(&Response::Status { status: Status::Denied }).unwrap();
        assert_eq!(json, r#"{"status":"DENIED"}"#);
        assert!(matches!(
            serde_json::from_str(&json).unwrap(),
            Response::Status { status: Status::Denied }
        ));

        let reply = Response::StartTime {
            ip: "10.0.0.5".parse().unwrap(),
            timestamp: 1234,
        };
        let json = serde_json::to_string(&reply).unwrap();
        match serde_json::from_str(&json).unwrap() {
            Response::StartTime { ip, timestamp } => {
                assert_eq!(ip, "10.0.0.5".parse::<IpAddr>().unwrap());
                assert_eq!(timestamp, 1234);
            }
            other => panic!("wrong response: {:?}", other),
        }
    }

    #[test]
    fn test_announcement_roundtrip() {
        let ann = Announcement::new("192.168.1.7:6000".parse().unwrap());
        let json = serde_json::to_string(&ann).unwrap();
        let restored: Announcement = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ann);
        assert_eq!(restored.addr(), "192.168.1.7:6000".parse().unwrap());
    }
}
