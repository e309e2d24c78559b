//! Nodes, their communication channels and their cached contexts.

pub mod channel;
pub mod context;
pub mod local;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::attributes::{parse_context, render_context};

pub use channel::{Artifact, Channel, INSTALL_MARKER, ProbeReport, ScriptOutput};
pub use context::{NodeContext, NodeContextService};
pub use local::LocalChannel;

/// Node-declared attributes merged over the probed base attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomContext {
    properties: BTreeMap<String, String>,
}

impl CustomContext {
    /// Parse attribute text; a repeated key keeps its last value.
    pub fn parse(text: &str) -> Self {
        Self {
            properties: parse_context(text),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Render for editing as attribute text.
    pub fn render(&self) -> String {
        render_context(&self.properties)
    }

    pub(crate) fn apply_to(&self, attributes: &mut BTreeMap<String, String>) {
        attributes.extend(self.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// A worker node known to the vault.
///
/// Identity is the node name.
#[derive(Clone)]
pub struct Node {
    name: String,
    channel: Option<Arc<dyn Channel>>,
    root: Option<PathBuf>,
    custom_contexts: Vec<CustomContext>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: None,
            root: None,
            custom_contexts: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Filesystem root of the node, used for node-online installs.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Register a custom context block; blocks apply in registration order.
    pub fn with_custom_context(mut self, context: CustomContext) -> Self {
        self.custom_contexts.push(context);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> Option<&Arc<dyn Channel>> {
        self.channel.as_ref()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn custom_contexts(&self) -> &[CustomContext] {
        &self.custom_contexts
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("channel", &self.channel.as_ref().map(|c| c.describe()))
            .field("root", &self.root)
            .field("custom_contexts", &self.custom_contexts)
            .finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Node {}
