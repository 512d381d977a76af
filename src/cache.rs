//! Torrent listing cache
//!
//! Keeps `GET /metadata` + `GET /files` results per magnet for a short time so
//! re-opening the same torrent does not hit the server again.
//! Stored at ~/.cache/subcast/torrents.json

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::{FileEntry, TorrentMetadata};

/// How long a cached listing stays valid
pub const CACHE_TTL_SECS: i64 = 5 * 60;

/// One cached torrent listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTorrent {
    pub stored_at: DateTime<Utc>,
    pub metadata: TorrentMetadata,
    pub files: Vec<FileEntry>,
}

/// File-backed cache keyed by magnet link
#[derive(Debug, Clone)]
pub struct TorrentCache {
    path: PathBuf,
    ttl: Duration,
}

impl TorrentCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl: Duration::seconds(CACHE_TTL_SECS),
        }
    }

    /// Cache in the user's cache directory
    pub fn open_default() -> Option<Self> {
        dirs::cache_dir().map(|p| Self::new(p.join("subcast").join("torrents.json")))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, CachedTorrent> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn is_fresh(&self, entry: &CachedTorrent, now: DateTime<Utc>) -> bool {
        now - entry.stored_at < self.ttl
    }

    /// Fresh entry for `magnet`
    pub fn get(&self, magnet: &str) -> Option<CachedTorrent> {
        self.get_at(magnet, Utc::now())
    }

    pub fn get_at(&self, magnet: &str, now: DateTime<Utc>) -> Option<CachedTorrent> {
        self.read_all()
            .remove(magnet)
            .filter(|entry| self.is_fresh(entry, now))
    }

    /// Store a listing, dropping expired entries on the way
    pub fn put(&self, magnet: &str, metadata: TorrentMetadata, files: Vec<FileEntry>) -> Result<()> {
        self.put_at(magnet, metadata, files, Utc::now())
    }

    pub fn put_at(
        &self,
        magnet: &str,
        metadata: TorrentMetadata,
        files: Vec<FileEntry>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut all = self.read_all();
        all.retain(|_, entry| self.is_fresh(entry, now));
        all.insert(
            magnet.to_string(),
            CachedTorrent {
                stored_at: now,
                metadata,
                files,
            },
        );

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&all)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache {}", self.path.display()))?;
        Ok(())
    }
}
