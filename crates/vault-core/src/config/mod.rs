//! Configuration for the vault store and the local node.
//!
//! Read from `vault.toml`:
//!
//! ```toml
//! [store]
//! dir = "/srv/vault"
//! cache_dir = "/var/cache/vault"
//!
//! [node]
//! name = "build-01"
//! root = "/home/ci"
//! context = """
//! tier=gold
//! """
//!
//! [[node.install]]
//! bundle = "jdk"
//! path = "jdk-${os.arch}"
//! ```

pub mod paths;
pub mod store;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use paths::{ARCHIVE_EXTENSION, StoreLayout};
pub use store::ConfigStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub node: NodeSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploads_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Filesystem root of the node; node-online installs land below it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Custom context in attribute text form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<InstallEntryConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallEntryConfig {
    pub bundle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl VaultConfig {
    /// Resolve the store layout, falling back to the default store directory.
    pub fn layout(&self) -> anyhow::Result<StoreLayout> {
        let dir = match &self.store.dir {
            Some(dir) => dir.clone(),
            None => StoreLayout::default_store_dir()?,
        };
        let mut layout = StoreLayout::new(dir);
        if let Some(dir) = &self.store.root_dir {
            layout = layout.with_root_dir(dir);
        }
        if let Some(dir) = &self.store.cache_dir {
            layout = layout.with_cache_dir(dir);
        }
        if let Some(dir) = &self.store.uploads_dir {
            layout = layout.with_uploads_dir(dir);
        }
        Ok(layout)
    }
}
