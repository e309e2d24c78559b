//! Catalog persistence as a single JSON document.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

use super::{Bundle, Catalog};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument {
    version: u32,
    #[serde(default)]
    bundles: Vec<Bundle>,
}

/// Loads and saves the catalog file.
///
/// Saves are atomic (tmp + rename). Loading yields a catalog whose cache
/// handles are unbound; callers must rehydrate it.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the catalog, or an empty one if the file does not exist.
    pub fn load(&self) -> Result<Catalog> {
        if !self.path.exists() {
            return Ok(Catalog::new());
        }

        let bytes = fs::read(&self.path).map_err(|e| VaultError::io(&self.path, e))?;
        let doc: CatalogDocument =
            serde_json::from_slice(&bytes).map_err(|source| VaultError::Catalog {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!(
            "Loaded catalog v{} with {} bundles from {}",
            doc.version,
            doc.bundles.len(),
            self.path.display()
        );
        Ok(Catalog::from_bundles(doc.bundles))
    }

    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| VaultError::not_configured("Catalog directory"))?;
        fs::create_dir_all(dir).map_err(|e| VaultError::io(dir, e))?;

        let doc = CatalogDocument {
            version: FORMAT_VERSION,
            bundles: catalog.bundles().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|source| VaultError::Catalog {
            path: self.path.clone(),
            source,
        })?;

        let tmp_path = dir.join(format!(".catalog.json.{}.tmp", std::process::id()));
        fs::write(&tmp_path, bytes).map_err(|e| VaultError::io(&tmp_path, e))?;

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(VaultError::io(&self.path, e));
        }
        Ok(())
    }
}
