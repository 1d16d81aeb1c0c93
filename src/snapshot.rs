//! Snapshot Store
//!
//! The shared document is an opaque blob to this subsystem: it is moved
//! byte-for-byte between memory, disk, and the wire, never interpreted.
//! Overwrites are whole-snapshot replacements; the last writer wins.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;

struct Inner {
    data: Vec<u8>,
    last_update: Option<DateTime<Utc>>,
}

/// Byte-exact persistence of the serialized document
pub struct SnapshotStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl SnapshotStore {
    /// Open the store, loading any snapshot already on disk. A missing
    /// file means an empty document.
    pub fn open(path: PathBuf) -> Result<Self> {
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        if !data.is_empty() {
            tracing::debug!("Loaded {} byte snapshot from {:?}", data.len(), path);
        }

        Ok(Self {
            path,
            inner: RwLock::new(Inner {
                data,
                last_update: None,
            }),
        })
    }

    /// Current snapshot bytes
    pub async fn bytes(&self) -> Vec<u8> {
        self.inner.read().await.data.clone()
    }

    /// Snapshot size in bytes
    pub async fn len(&self) -> usize {
        self.inner.read().await.data.len()
    }

    /// Whether the snapshot is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.data.is_empty()
    }

    /// When the snapshot was last overwritten in this process
    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_update
    }

    /// Overwrite the snapshot in memory and on disk
    pub async fn replace(&self, data: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Write-then-rename so a crash never leaves a torn snapshot
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &data)?;
        std::fs::rename(&tmp, &self.path)?;

        inner.data = data;
        inner.last_update = Some(Utc::now());
        Ok(())
    }
}
