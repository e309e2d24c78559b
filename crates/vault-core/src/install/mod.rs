//! Installing a bundle onto a node.
//!
//! One install is: fetch (cached) node context, select a package, transfer its
//! archive if the location holds different content, then run hooks. Selection
//! and transfer failures end the install; hook failures are only reported.

pub mod hooks;
pub mod listener;
pub mod online;
pub mod selector;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::PackageId;
use crate::error::{Result, VaultError};
use crate::node::{Artifact, Channel, Node, NodeContextService};
use crate::vault::Vault;

pub use hooks::{InstallHook, Installed, OnInstalled};
pub use listener::{BufferListener, NullListener, TaskListener};
pub use online::{InstallEntry, NodeLifecycle, OnlineInstaller, OnlineReport};
pub use selector::PackageSelector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub location: PathBuf,
    pub package_id: PackageId,
    /// False when the location already held the selected content.
    pub installed: bool,
}

pub struct PackageInstaller {
    vault: Arc<Vault>,
    contexts: Arc<NodeContextService>,
    bundle_name: Option<String>,
    location: Option<PathBuf>,
    node: Option<Node>,
    channel: Option<Arc<dyn Channel>>,
    listener: Arc<dyn TaskListener>,
    hooks: Vec<InstallHook>,
}

impl PackageInstaller {
    /// An installer with the install-script hook registered.
    pub fn new(vault: Arc<Vault>, contexts: Arc<NodeContextService>) -> Self {
        Self {
            vault,
            contexts,
            bundle_name: None,
            location: None,
            node: None,
            channel: None,
            listener: Arc::new(NullListener),
            hooks: vec![InstallHook::InstallScript],
        }
    }

    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle_name = Some(bundle.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.node = Some(node);
        self
    }

    /// Override the node's own channel.
    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Append a hook after those already registered.
    pub fn with_hook(mut self, hook: InstallHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Replace the registered hooks.
    pub fn with_hooks(mut self, hooks: Vec<InstallHook>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn bundle_name(&self) -> Result<&str> {
        self.bundle_name
            .as_deref()
            .ok_or_else(|| VaultError::not_configured("Bundle name"))
    }

    pub fn location(&self) -> Result<&Path> {
        self.location
            .as_deref()
            .ok_or_else(|| VaultError::not_configured("Location"))
    }

    pub fn node(&self) -> Result<&Node> {
        self.node
            .as_ref()
            .ok_or_else(|| VaultError::not_configured("Node"))
    }

    /// The explicit channel, else the node's channel.
    pub fn channel(&self) -> Result<Arc<dyn Channel>> {
        if let Some(channel) = &self.channel {
            return Ok(Arc::clone(channel));
        }
        self.node()?
            .channel()
            .cloned()
            .ok_or_else(|| VaultError::not_configured("Channel"))
    }

    pub fn hooks(&self) -> &[InstallHook] {
        &self.hooks
    }

    /// Run the install. Failures are also written to the listener.
    pub fn install(&self) -> Result<InstallOutcome> {
        self.run().inspect_err(|e| {
            let node = self.node.as_ref().map_or("<unset>", Node::name);
            let bundle = self.bundle_name.as_deref().unwrap_or("<unset>");
            tracing::error!("Install of {} on {} failed: {}", bundle, node, e);
            self.listener.error(&format!(
                "Failed to install bundle: {bundle} on node: {node}: {}",
                error_chain(e)
            ));
        })
    }

    fn run(&self) -> Result<InstallOutcome> {
        let bundle = self.bundle_name()?;
        let location = self.location()?;
        let node = self.node()?;
        let channel = self.channel()?;

        let context = self.contexts.get(node, channel.as_ref())?;
        self.listener.info(&format!("Context of node {}:", node.name()));
        for line in context.describe().lines() {
            self.listener.info(line);
        }
        let pkg = PackageSelector::new(&self.vault).select(bundle, &context)?;

        let archive = pkg
            .cache_file()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.vault.cache().entry_path(bundle, pkg.id()));
        let artifact = Artifact::from_file(&archive).map_err(|e| VaultError::io(&archive, e))?;

        let installed = channel
            .install_if_necessary(&artifact, location)
            .map_err(|source| VaultError::Transfer {
                bundle: bundle.to_string(),
                node: node.name().to_string(),
                source,
            })?;

        let outcome = InstallOutcome {
            location: location.to_path_buf(),
            package_id: pkg.id(),
            installed,
        };
        if !installed {
            self.listener.info(&format!(
                "Bundle {} already installed at {}",
                bundle,
                location.display()
            ));
            return Ok(outcome);
        }

        self.listener.info(&format!(
            "Installed bundle {} ({}) to {}",
            bundle,
            pkg.id(),
            location.display()
        ));
        let done = Installed {
            bundle,
            package: &pkg,
            location,
            context: &context,
            channel: channel.as_ref(),
            listener: self.listener.as_ref(),
        };
        for hook in &self.hooks {
            if let Err(e) = hook.on_installed(&done) {
                let failure = VaultError::HookFailure {
                    hook: hook.name().to_string(),
                    message: format!("{e:#}"),
                };
                tracing::error!("{}", failure);
                self.listener.error(&failure.to_string());
            }
        }
        Ok(outcome)
    }
}

impl fmt::Debug for PackageInstaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageInstaller")
            .field("bundle_name", &self.bundle_name)
            .field("location", &self.location)
            .field("node", &self.node)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// `error: cause: cause` for listener output.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
