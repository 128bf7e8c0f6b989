//! In-memory asset store using DashMap.
//!
//! Useful for embedding templates in the binary and for tests: every read
//! is counted per path, and an optional delay widens race windows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{AssetError, AssetReader, AssetResult};

#[derive(Debug, Default)]
pub struct MemoryAssetReader {
    assets: DashMap<String, String>,
    reads: DashMap<String, AtomicUsize>,
    read_delay: Option<Duration>,
}

impl MemoryAssetReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(self, path: &str, content: &str) -> Self {
        self.insert(path, content);
        self
    }

    /// Sleep for `delay` inside every read
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Add or replace an asset
    pub fn insert(&self, path: &str, content: &str) {
        self.assets.insert(path.to_string(), content.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.assets.remove(path);
    }

    /// Number of reads attempted for `path`, including failed ones
    pub fn read_count(&self, path: &str) -> usize {
        self.reads
            .get(path)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl AssetReader for MemoryAssetReader {
    async fn read(&self, path: &str) -> AssetResult<String> {
        self.reads
            .entry(path.to_string())
            .or_default()
            .fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }

        self.assets
            .get(path)
            .map(|content| content.clone())
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }
}
