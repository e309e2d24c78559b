//! Artifact cache: one built archive per (bundle, package).
//!
//! Entries live at `{cache}/{bundle},{package}.zip`. Their presence is a cache,
//! never a source of truth: any entry can be rebuilt from the package source.
//! Builds for the same key are serialized and published by rename, so a
//! reader never observes a partially written archive.

pub mod archiver;
pub mod filter;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::catalog::{Package, PackageId};
use crate::config::StoreLayout;
use crate::error::{Result, VaultError};

pub use archiver::archive_dir;
pub use filter::FileFilter;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct ArtifactCache {
    layout: StoreLayout,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ArtifactCache {
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            layout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.layout.cache_dir()
    }

    /// Deterministic entry path for a (bundle, package) pair.
    pub fn entry_path(&self, bundle: &str, id: PackageId) -> PathBuf {
        self.layout.cache_file(bundle, id)
    }

    pub fn exists(&self, bundle: &str, id: PackageId) -> bool {
        self.entry_path(bundle, id).is_file()
    }

    /// Rebuild the entry for `pkg` from `source` under the entry's key lock.
    pub fn build(&self, bundle: &str, pkg: &Package, source: &Path) -> Result<PathBuf> {
        self.locked(bundle, pkg.id(), || self.build_entry(bundle, pkg, source))
    }

    /// Delete the entry if present. Returns whether a file was removed.
    pub fn remove(&self, bundle: &str, id: PackageId) -> Result<bool> {
        self.locked(bundle, id, || self.remove_entry(bundle, id))
    }

    /// Run `f` holding the lock of the (bundle, package) entry.
    ///
    /// The lock is not reentrant: `f` must use the `_entry` variants, not
    /// [`ArtifactCache::build`] or [`ArtifactCache::remove`] for the same key.
    pub fn locked<R>(&self, bundle: &str, id: PackageId, f: impl FnOnce() -> R) -> R {
        let file = self.entry_path(bundle, id);
        let lock = self.key_lock(&file);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(&file, lock);
        result
    }

    /// Rebuild without taking the key lock; callers hold it via [`ArtifactCache::locked`].
    ///
    /// The prior entry is deleted first; if the source directory is missing
    /// the package is left without a cache entry.
    pub(crate) fn build_entry(&self, bundle: &str, pkg: &Package, source: &Path) -> Result<PathBuf> {
        let file = self.entry_path(bundle, pkg.id());

        tracing::info!("Building package cache: {}", file.display());

        if file.exists()
            && let Err(e) = fs::remove_file(&file)
        {
            tracing::error!("Failed to remove old cache: {}: {}", file.display(), e);
        }

        if !source.is_dir() {
            return Err(VaultError::SourceNotFound(source.to_path_buf()));
        }

        let filter = FileFilter::new(&pkg.includes, &pkg.excludes)?;
        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|e| VaultError::io(&dir, e))?;

        let tmp = dir.join(format!(
            ".{}.{}.{}.tmp",
            pkg.id(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let count = match archive_dir(source, &tmp, &filter) {
            Ok(count) => count,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&tmp, &file) {
            let _ = fs::remove_file(&tmp);
            return Err(VaultError::io(&file, e));
        }

        tracing::debug!("Archived {} files into {}", count, file.display());
        Ok(file)
    }

    pub(crate) fn remove_entry(&self, bundle: &str, id: PackageId) -> Result<bool> {
        let file = self.entry_path(bundle, id);

        tracing::info!("Removing package cache: {}", file.display());

        match fs::remove_file(&file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(VaultError::io(&file, e)),
        }
    }

    fn key_lock(&self, file: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(file.to_path_buf()).or_default().clone()
    }

    /// Drop the table entry once no other thread holds or waits on it.
    fn release(&self, file: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(file);
        }
    }
}
