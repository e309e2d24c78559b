//! Installs triggered by a node coming online.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::InstallEntryConfig;
use crate::error::{Result, VaultError};
use crate::node::{Node, NodeContextService};
use crate::vault::Vault;

use super::{InstallHook, InstallOutcome, NullListener, PackageInstaller, TaskListener};

/// Install location root, relative to the node root.
pub const ONLINE_INSTALL_DIR: &str = "vault/install";

/// One bundle to install when a node comes online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    pub bundle: String,
    /// Location under the install root; `${name}` reads a system property.
    /// Defaults to the bundle name.
    pub path: Option<String>,
}

impl InstallEntry {
    pub fn new(bundle: impl Into<String>) -> Self {
        Self {
            bundle: bundle.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<InstallEntryConfig> for InstallEntry {
    fn from(config: InstallEntryConfig) -> Self {
        Self {
            bundle: config.bundle,
            path: config.path,
        }
    }
}

#[derive(Debug, Default)]
pub struct OnlineReport {
    pub installed: Vec<InstallOutcome>,
    /// Bundles whose install failed.
    pub failed: Vec<String>,
}

pub struct OnlineInstaller {
    vault: Arc<Vault>,
    contexts: Arc<NodeContextService>,
    entries: Vec<InstallEntry>,
    hooks: Vec<InstallHook>,
    listener: Arc<dyn TaskListener>,
}

impl OnlineInstaller {
    pub fn new(vault: Arc<Vault>, contexts: Arc<NodeContextService>) -> Self {
        Self {
            vault,
            contexts,
            entries: Vec::new(),
            hooks: vec![InstallHook::InstallScript],
            listener: Arc::new(NullListener),
        }
    }

    pub fn with_entry(mut self, entry: InstallEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_entries(mut self, entries: impl IntoIterator<Item = InstallEntry>) -> Self {
        self.entries.extend(entries);
        self
    }

    pub fn with_hooks(mut self, hooks: Vec<InstallHook>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn entries(&self) -> &[InstallEntry] {
        &self.entries
    }

    /// Install every entry in order. One failing entry does not stop the rest.
    pub fn install_all(&self, node: &Node) -> Result<OnlineReport> {
        let mut report = OnlineReport::default();
        if self.entries.is_empty() {
            return Ok(report);
        }

        let root = node
            .root()
            .ok_or_else(|| VaultError::not_configured("Node root"))?;
        let channel = node
            .channel()
            .cloned()
            .ok_or_else(|| VaultError::not_configured("Channel"))?;
        let context = self.contexts.get(node, channel.as_ref())?;
        let install_root = root.join(ONLINE_INSTALL_DIR);

        for entry in &self.entries {
            let path = entry.path.as_deref().unwrap_or(&entry.bundle);
            let location: PathBuf =
                install_root.join(interpolate(path, context.system_properties()));

            tracing::info!(
                "Installing bundle: {} on node: {} to {}",
                entry.bundle,
                node.name(),
                location.display()
            );
            let result = PackageInstaller::new(Arc::clone(&self.vault), Arc::clone(&self.contexts))
                .with_bundle(entry.bundle.clone())
                .with_location(location)
                .with_node(node.clone())
                .with_channel(Arc::clone(&channel))
                .with_listener(Arc::clone(&self.listener))
                .with_hooks(self.hooks.clone())
                .install();

            match result {
                Ok(outcome) => report.installed.push(outcome),
                Err(_) => report.failed.push(entry.bundle.clone()),
            }
        }
        Ok(report)
    }
}

/// Replace `${name}` with the named property; unknown names stay verbatim.
pub fn interpolate(text: &str, properties: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match properties.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Node connect/disconnect handling.
pub struct NodeLifecycle {
    installer: OnlineInstaller,
    contexts: Arc<NodeContextService>,
}

impl NodeLifecycle {
    pub fn new(installer: OnlineInstaller) -> Self {
        let contexts = Arc::clone(&installer.contexts);
        Self {
            installer,
            contexts,
        }
    }

    pub fn on_online(&self, node: &Node) -> Result<OnlineReport> {
        tracing::info!("Node online: {}", node.name());
        self.installer.install_all(node)
    }

    /// Forget the node's context. Returns whether one was cached.
    pub fn on_offline(&self, node: &Node) -> bool {
        tracing::info!("Node offline: {}", node.name());
        self.contexts.on_offline(node.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_known_and_unknown_names() {
        let props = BTreeMap::from([
            ("os.arch".to_string(), "amd64".to_string()),
            ("user.name".to_string(), "ci".to_string()),
        ]);

        assert_eq!(interpolate("jdk-${os.arch}", &props), "jdk-amd64");
        assert_eq!(interpolate("${user.name}/${nope}", &props), "ci/${nope}");
        assert_eq!(interpolate("plain", &props), "plain");
        assert_eq!(interpolate("open-${os.arch", &props), "open-${os.arch");
    }

    #[test]
    fn entry_from_config() {
        let entry = InstallEntry::from(InstallEntryConfig {
            bundle: "jdk".to_string(),
            path: Some("java".to_string()),
        });
        assert_eq!(entry, InstallEntry::new("jdk").with_path("java"));
    }
}
