//! Post-install hooks.
//!
//! Hooks run in registration order after a transfer actually happened. A
//! failing hook is reported and skipped; it never fails the install.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::cache::filter::MATCH_OPTIONS;
use crate::catalog::Package;
use crate::node::{Channel, NodeContext};

use super::listener::TaskListener;

/// Script run from the root of freshly installed unix content.
pub const INSTALL_SCRIPT: &str = "install.sh";
/// Script run from the root of freshly installed windows content.
pub const INSTALL_SCRIPT_WINDOWS: &str = "install.cmd";

/// Everything a hook gets to see about a finished transfer.
pub struct Installed<'a> {
    pub bundle: &'a str,
    pub package: &'a Package,
    pub location: &'a Path,
    pub context: &'a NodeContext,
    pub channel: &'a dyn Channel,
    pub listener: &'a dyn TaskListener,
}

/// Uniform post-install capability.
pub trait OnInstalled: Send + Sync {
    fn name(&self) -> &str;
    fn on_installed(&self, installed: &Installed<'_>) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub enum InstallHook {
    /// Run `install.sh` / `install.cmd` if present at the location root.
    InstallScript,
    /// Set executable bits on installed files matching any glob.
    ExecutableBits(Vec<String>),
    Custom(Arc<dyn OnInstalled>),
}

impl fmt::Debug for InstallHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstallScript => f.write_str("InstallScript"),
            Self::ExecutableBits(patterns) => f.debug_tuple("ExecutableBits").field(patterns).finish(),
            Self::Custom(hook) => f.debug_tuple("Custom").field(&hook.name()).finish(),
        }
    }
}

impl OnInstalled for InstallHook {
    fn name(&self) -> &str {
        match self {
            Self::InstallScript => "install-script",
            Self::ExecutableBits(_) => "executable-bits",
            Self::Custom(hook) => hook.name(),
        }
    }

    fn on_installed(&self, installed: &Installed<'_>) -> anyhow::Result<()> {
        match self {
            Self::InstallScript => run_install_script(installed),
            Self::ExecutableBits(patterns) => set_executable_bits(patterns, installed),
            Self::Custom(hook) => hook.on_installed(installed),
        }
    }
}

/// Script name for the node's platform.
pub fn install_script_name(context: &NodeContext) -> &'static str {
    match context.attribute("os.family") {
        Some(family) if family.eq_ignore_ascii_case("windows") => INSTALL_SCRIPT_WINDOWS,
        _ => INSTALL_SCRIPT,
    }
}

fn run_install_script(installed: &Installed<'_>) -> anyhow::Result<()> {
    let script = installed.location.join(install_script_name(installed.context));
    if !installed.channel.exists(&script)? {
        return Ok(());
    }

    installed
        .listener
        .info(&format!("Running install script: {}", script.display()));
    let output = installed
        .channel
        .run_script(&script, installed.location)
        .with_context(|| format!("Failed to run {}", script.display()))?;

    for line in output.output.lines() {
        installed.listener.info(line);
    }
    if !output.success() {
        match output.status {
            Some(code) => anyhow::bail!("{} exited with status {}", script.display(), code),
            None => anyhow::bail!("{} was terminated", script.display()),
        }
    }
    Ok(())
}

fn set_executable_bits(patterns: &[String], installed: &Installed<'_>) -> anyhow::Result<()> {
    let patterns = patterns
        .iter()
        .map(|p| glob::Pattern::new(p).with_context(|| format!("Invalid glob pattern: {p}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    for file in installed.channel.list_files(installed.location)? {
        if patterns.iter().any(|p| p.matches_with(&file, MATCH_OPTIONS)) {
            let path = installed.location.join(&file);
            installed
                .channel
                .set_executable(&path)
                .with_context(|| format!("Failed to set executable: {}", path.display()))?;
            tracing::debug!("Set executable: {}", path.display());
        }
    }
    Ok(())
}
