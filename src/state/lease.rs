//! Global Lease State
//!
//! The single mutual-exclusion lease as this node last saw it. Exactly one
//! record is authoritative locally at any instant; updates overwrite it,
//! they are never merged. The record survives restarts via a small JSON
//! file in the data directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

/// The global lease as currently known to this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Control endpoint of the peer holding the lease
    pub holder: SocketAddr,
    /// When the holder acquired it
    pub acquired_at: DateTime<Utc>,
}

impl LeaseRecord {
    /// Create a record acquired right now by the given holder
    pub fn held_by(holder: SocketAddr) -> Self {
        Self {
            holder,
            acquired_at: Utc::now(),
        }
    }

    /// Whether this record has outlived the expiration window.
    /// A record acquired in the future (clock skew) counts as fresh.
    pub fn is_expired(&self, expiration: Duration) -> bool {
        match (Utc::now() - self.acquired_at).to_std() {
            Ok(age) => age > expiration,
            Err(_) => false,
        }
    }
}

/// Mutex-guarded lease record with disk persistence
pub struct LeaseState {
    path: PathBuf,
    record: RwLock<Option<LeaseRecord>>,
    expiration: Duration,
}

impl LeaseState {
    /// Open the lease state, loading any record persisted at `path`.
    /// A missing or corrupt file means the lease is free.
    pub fn load(path: PathBuf, expiration: Duration) -> Self {
        let record = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<Option<LeaseRecord>>(&content).ok())
            .flatten();

        if let Some(ref r) = record {
            tracing::debug!("Loaded persisted lease held by {}", r.holder);
        }

        Self {
            path,
            record: RwLock::new(record),
            expiration,
        }
    }

    /// The current record, expired or not
    pub async fn current(&self) -> Option<LeaseRecord> {
        self.record.read().await.clone()
    }

    /// Whether the lease is up for grabs: no record, or one that has
    /// outlived the expiration window
    pub async fn is_free(&self) -> bool {
        match self.record.read().await.as_ref() {
            None => true,
            Some(record) => record.is_expired(self.expiration),
        }
    }

    /// Whether the given endpoint holds a live lease
    pub async fn holds(&self, addr: SocketAddr) -> bool {
        match self.record.read().await.as_ref() {
            Some(record) => record.holder == addr && !record.is_expired(self.expiration),
            None => false,
        }
    }

    /// Overwrite the record and persist it
    pub async fn set(&self, record: Option<LeaseRecord>) -> Result<()> {
        let mut guard = self.record.write().await;
        self.persist(&record)?;
        *guard = record;
        Ok(())
    }

    /// Clear the record if it has outlived the expiration window.
    /// Returns true when something was cleared.
    pub async fn expire_stale(&self) -> Result<bool> {
        let mut guard = self.record.write().await;
        match guard.as_ref() {
            Some(record) if record.is_expired(self.expiration) => {
                tracing::info!(
                    "Lease held by {} expired after {:?}, releasing",
                    record.holder,
                    self.expiration
                );
                self.persist(&None)?;
                *guard = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn persist(&self, record: &Option<LeaseRecord>) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
