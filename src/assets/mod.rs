//! Asset reader for template, layout and stylesheet sources.
//!
//! Assets are addressed by relative paths (e.g. `"welcome.html"`) inside a
//! content store. Reading never caches; the compile cache one level up is
//! the only caching layer.

mod memory;

pub use memory::MemoryAssetReader;

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Asset-reader error type
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Could not read asset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl AssetError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound(_))
    }
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Source of template and stylesheet text.
#[async_trait]
pub trait AssetReader: Send + Sync {
    /// Read the full text of the asset at `path`.
    async fn read(&self, path: &str) -> AssetResult<String>;
}

/// Reads assets from a directory on disk.
///
/// Paths are resolved relative to `root`; absolute paths and `..`
/// components are rejected as not found so a template manifest can never
/// reach outside the content store.
#[derive(Debug, Clone)]
pub struct FsAssetReader {
    root: PathBuf,
}

impl FsAssetReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl AssetReader for FsAssetReader {
    async fn read(&self, path: &str) -> AssetResult<String> {
        let full = self
            .resolve(path)
            .ok_or_else(|| AssetError::NotFound(path.to_string()))?;

        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(path.to_string()))
            }
            Err(e) => Err(AssetError::Io {
                path: path.to_string(),
                source: e,
            }),
        }
    }
}
