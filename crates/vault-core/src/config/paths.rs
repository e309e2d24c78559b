//! Store directory layout.

use std::path::{Path, PathBuf};

use crate::catalog::PackageId;

/// Extension of built artifacts.
pub const ARCHIVE_EXTENSION: &str = "zip";

const CATALOG_FILE: &str = "catalog.json";

/// The four logical areas managed by the vault.
///
/// `root`, `cache` and `uploads` default to subdirectories of the store
/// directory unless explicitly overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    store_dir: PathBuf,
    root_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    uploads_dir: Option<PathBuf>,
}

impl StoreLayout {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            root_dir: None,
            cache_dir: None,
            uploads_dir: None,
        }
    }

    /// Default store under the platform data directory.
    pub fn default_store_dir() -> anyhow::Result<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| anyhow::anyhow!("Cannot determine data directory"))?;
        Ok(base.join("vault"))
    }

    pub fn with_root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(dir.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_uploads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.uploads_dir = Some(dir.into());
        self
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn root_dir(&self) -> PathBuf {
        self.root_dir
            .clone()
            .unwrap_or_else(|| self.store_dir.join("root"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.store_dir.join("cache"))
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.uploads_dir
            .clone()
            .unwrap_or_else(|| self.store_dir.join("uploads"))
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.store_dir.join(CATALOG_FILE)
    }

    /// `{cache}/{bundle},{package}.zip`
    pub fn cache_file(&self, bundle: &str, id: PackageId) -> PathBuf {
        self.cache_dir()
            .join(format!("{bundle},{id}.{ARCHIVE_EXTENSION}"))
    }
}
