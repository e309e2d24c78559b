//! Error taxonomy for catalog, cache, selection and installation failures.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors surfaced by vault operations.
///
/// Catalog integrity errors (`DuplicateBundle`, `NoSuchBundle`, `NoSuchPackage`)
/// leave the catalog unchanged. Hook failures are never returned from an
/// install; they only exist so they can be logged uniformly.
#[derive(Debug, Error)]
pub enum VaultError {
    /// A required input was not set and could not be derived.
    #[error("{0} not configured")]
    Configuration(String),

    #[error("Bundle already exists: {0}")]
    DuplicateBundle(String),

    #[error("No such bundle: {0}")]
    NoSuchBundle(String),

    #[error("No such package: {id} in bundle: {bundle}")]
    NoSuchPackage { bundle: String, id: String },

    /// A vault-relative path that would leave the vault root.
    #[error("Path escapes the vault root: {0}")]
    InvalidPath(String),

    #[error("No such upload: {0}")]
    NoSuchUpload(String),

    /// The package source directory is missing at build time.
    #[error("Package source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// No package of the bundle matches the node, or the bundle is unknown.
    #[error("Unable to select package for bundle: {bundle}")]
    PackageNotSelectable { bundle: String },

    #[error("Failed to build package cache for bundle: {bundle} ({id})")]
    Build {
        bundle: String,
        id: String,
        #[source]
        source: Box<VaultError>,
    },

    #[error("Failed to fetch context for node: {node}")]
    Probe {
        node: String,
        #[source]
        source: ChannelError,
    },

    #[error("Failed to transfer package for bundle: {bundle} to node: {node}")]
    Transfer {
        bundle: String,
        node: String,
        #[source]
        source: ChannelError,
    },

    #[error("Install hook failed: {hook}: {message}")]
    HookFailure { hook: String, message: String },

    #[error("Archive error: {}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Invalid glob pattern: {pattern}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to read or write catalog: {}", .path.display())]
    Catalog {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl VaultError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_configured(what: &str) -> Self {
        Self::Configuration(what.to_string())
    }
}

/// Errors reported by a node communication channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),

    #[error("Script failed: {}: {message}", .script.display())]
    Script { script: PathBuf, message: String },

    #[error("Channel is closed: {0}")]
    Disconnected(String),
}
