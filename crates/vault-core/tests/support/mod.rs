#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use vault_core::ChannelError;
use vault_core::config::StoreLayout;
use vault_core::node::{Artifact, Channel, LocalChannel, ProbeReport, ScriptOutput};
use vault_core::vault::Vault;

pub struct Fixture {
    pub temp: TempDir,
    pub vault: Arc<Vault>,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("tempdir should be created");
        let vault = Vault::open(StoreLayout::new(temp.path().join("store")))
            .expect("vault should open");
        Self {
            temp,
            vault: Arc::new(vault),
        }
    }

    /// Create `<vault root>/<path>` holding the given (relative file, content) pairs.
    pub fn source(&self, path: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.vault.layout().root_dir().join(path);
        for (file, content) in files {
            let target = dir.join(file);
            fs::create_dir_all(target.parent().expect("file has a parent"))
                .expect("source dir should be created");
            fs::write(&target, content).expect("source file should be written");
        }
        fs::create_dir_all(&dir).expect("source dir should be created");
        dir
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp.path().join(relative)
    }

    pub fn reopen(&self) -> Vault {
        Vault::open(StoreLayout::new(self.temp.path().join("store"))).expect("vault should reopen")
    }
}

/// Local filesystem channel reporting fixed attributes and counting probes.
#[derive(Debug)]
pub struct ScriptedChannel {
    local: LocalChannel,
    attributes: BTreeMap<String, String>,
    system_properties: BTreeMap<String, String>,
    probes: AtomicUsize,
    transfers: AtomicUsize,
}

impl ScriptedChannel {
    pub fn new(attributes: &[(&str, &str)]) -> Self {
        Self {
            local: LocalChannel::new(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            system_properties: BTreeMap::new(),
            probes: AtomicUsize::new(0),
            transfers: AtomicUsize::new(0),
        }
    }

    pub fn linux() -> Self {
        Self::new(&[
            ("os.family", "unix"),
            ("os.name", "linux"),
            ("os.arch", "amd64"),
            ("os.version", "6.1.0"),
        ])
    }

    pub fn with_system_property(mut self, key: &str, value: &str) -> Self {
        self.system_properties
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }
}

impl Channel for ScriptedChannel {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    fn probe(&self) -> Result<ProbeReport, ChannelError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeReport {
            attributes: self.attributes.clone(),
            system_properties: self.system_properties.clone(),
        })
    }

    fn install_if_necessary(&self, artifact: &Artifact, target: &Path) -> Result<bool, ChannelError> {
        let transferred = self.local.install_if_necessary(artifact, target)?;
        if transferred {
            self.transfers.fetch_add(1, Ordering::SeqCst);
        }
        Ok(transferred)
    }

    fn exists(&self, path: &Path) -> Result<bool, ChannelError> {
        self.local.exists(path)
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<String>, ChannelError> {
        self.local.list_files(dir)
    }

    fn set_executable(&self, path: &Path) -> Result<(), ChannelError> {
        self.local.set_executable(path)
    }

    fn run_script(&self, script: &Path, base_dir: &Path) -> Result<ScriptOutput, ChannelError> {
        self.local.run_script(script, base_dir)
    }
}
