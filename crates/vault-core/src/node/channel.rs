//! Remote execution boundary between the vault and a node.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ChannelError;

/// Marker file written into an install location, holding the artifact digest.
pub const INSTALL_MARKER: &str = ".vault-installed";

/// Facts returned by a node probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// `os.family`, `os.name`, `os.arch`, `os.version`.
    pub attributes: BTreeMap<String, String>,
    /// Full system-property snapshot of the node.
    pub system_properties: BTreeMap<String, String>,
}

/// A built archive ready to be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Archive path on the controller.
    pub path: PathBuf,
    /// blake3 digest of the archive.
    pub digest: String,
}

impl Artifact {
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            digest: crate::fs::hash_file(path)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Operations the vault needs from a node. Calls block for the round trip.
///
/// Paths passed to a channel are paths on the node.
pub trait Channel: Send + Sync + fmt::Debug {
    /// Human readable channel description for logs.
    fn describe(&self) -> String;

    /// Gather the node's base attributes and system properties.
    fn probe(&self) -> Result<ProbeReport, ChannelError>;

    /// Unpack `artifact` into `target` unless `target` already holds the same
    /// content. Returns whether a transfer happened.
    fn install_if_necessary(&self, artifact: &Artifact, target: &Path)
    -> Result<bool, ChannelError>;

    fn exists(&self, path: &Path) -> Result<bool, ChannelError>;

    /// Files below `dir`, as `/`-separated relative paths.
    fn list_files(&self, dir: &Path) -> Result<Vec<String>, ChannelError>;

    fn set_executable(&self, path: &Path) -> Result<(), ChannelError>;

    /// Run a script with `base_dir` as working directory and exposed in the
    /// environment.
    fn run_script(&self, script: &Path, base_dir: &Path) -> Result<ScriptOutput, ChannelError>;
}
