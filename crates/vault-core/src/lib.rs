//! Vault Core Library
//!
//! Distributes platform-specific file bundles to worker nodes: a catalog of
//! bundles and packages, an artifact cache of built archives, per-node
//! context acquisition, package selection and idempotent installation.

pub mod attributes;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fs;
pub mod install;
pub mod node;
pub mod vault;

pub use error::{ChannelError, Result, VaultError};

/// Re-exports of commonly used types
pub mod prelude {
    // Catalog
    pub use crate::attributes::SelectorProperties;
    pub use crate::catalog::{Bundle, Catalog, Package, PackageId, PackageSpec};

    // Configuration
    pub use crate::config::{ConfigStore, StoreLayout, VaultConfig};

    // Vault
    pub use crate::vault::{BundleUpdate, UploadedFile, Uploads, Vault};

    // Nodes
    pub use crate::node::{
        Channel, CustomContext, LocalChannel, Node, NodeContext, NodeContextService,
    };

    // Installation
    pub use crate::install::{
        BufferListener, InstallEntry, InstallHook, InstallOutcome, NodeLifecycle, NullListener,
        OnInstalled, OnlineInstaller, PackageInstaller, PackageSelector, TaskListener,
    };

    // Errors
    pub use crate::error::{ChannelError, Result, VaultError};
}
