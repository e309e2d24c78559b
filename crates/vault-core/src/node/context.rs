//! Node context snapshots and their process-wide cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};

use chrono::{DateTime, Utc};

use crate::error::{Result, VaultError};

use super::{Channel, Node};

/// Immutable snapshot of a node's facts at fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContext {
    node: String,
    attributes: BTreeMap<String, String>,
    system_properties: BTreeMap<String, String>,
    fetched_at: DateTime<Utc>,
}

impl NodeContext {
    pub fn new(
        node: impl Into<String>,
        attributes: BTreeMap<String, String>,
        system_properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            node: node.into(),
            attributes,
            system_properties,
            fetched_at: Utc::now(),
        }
    }

    /// Context with attributes only; handy for selection without a probe.
    pub fn from_attributes<I, K, V>(node: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            node,
            attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            BTreeMap::new(),
        )
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn system_properties(&self) -> &BTreeMap<String, String> {
        &self.system_properties
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// `  key=value` lines, one per attribute.
    pub fn describe(&self) -> String {
        self.attributes
            .iter()
            .map(|(k, v)| format!("  {k}={v}\n"))
            .collect()
    }
}

type Slot = Arc<Mutex<Option<Arc<NodeContext>>>>;

/// Whether the slot holds a context or is being filled right now.
fn slot_is_filled(slot: &Slot) -> bool {
    match slot.try_lock() {
        Ok(guard) => guard.is_some(),
        Err(TryLockError::Poisoned(e)) => e.into_inner().is_some(),
        Err(TryLockError::WouldBlock) => true,
    }
}

/// Per-node memoized contexts, invalidated when a node goes offline.
///
/// The map lock only guards slot lookup; a fetch runs under the node's own
/// slot lock, so fetches for different nodes proceed in parallel.
#[derive(Debug, Default)]
pub struct NodeContextService {
    slots: RwLock<HashMap<String, Slot>>,
}

impl NodeContextService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe the node and merge its custom context blocks, uncached.
    pub fn fetch(&self, node: &Node, channel: &dyn Channel) -> Result<NodeContext> {
        tracing::debug!(
            "Fetching context for node: {} on channel: {}",
            node.name(),
            channel.describe()
        );

        let report = channel.probe().map_err(|source| VaultError::Probe {
            node: node.name().to_string(),
            source,
        })?;

        let mut attributes = report.attributes;
        for custom in node.custom_contexts() {
            custom.apply_to(&mut attributes);
        }

        Ok(NodeContext::new(
            node.name(),
            attributes,
            report.system_properties,
        ))
    }

    /// Cached context for the node, fetching it on first use.
    pub fn get(&self, node: &Node, channel: &dyn Channel) -> Result<Arc<NodeContext>> {
        let slot = self.slot(node.name());
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(context) = guard.as_ref() {
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(self.fetch(node, channel)?);
        *guard = Some(Arc::clone(&context));
        Ok(context)
    }

    /// Cached context, without fetching.
    pub fn cached(&self, node: &str) -> Option<Arc<NodeContext>> {
        let slot = {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            slots.get(node).cloned()
        }?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// Drop the node's cached context. Returns whether one was present.
    ///
    /// A fetch still running for the node counts as present; the call does
    /// not wait for it.
    pub fn on_offline(&self, node: &str) -> bool {
        let removed = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node);
        let had_context = removed.as_ref().is_some_and(slot_is_filled);
        if had_context {
            tracing::trace!("Removed cached context for: {}", node);
        }
        had_context
    }

    pub fn invalidate_all(&self) {
        tracing::trace!("Clearing node context cache");
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn slot(&self, node: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(node.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::node::{Artifact, CustomContext, ProbeReport, ScriptOutput};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeChannel {
        probes: AtomicUsize,
        fail: bool,
    }

    impl Channel for FakeChannel {
        fn describe(&self) -> String {
            "fake".to_string()
        }

        fn probe(&self) -> std::result::Result<ProbeReport, ChannelError> {
            if self.fail {
                return Err(ChannelError::Disconnected("fake".to_string()));
            }
            let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ProbeReport {
                attributes: BTreeMap::from([
                    ("os.family".to_string(), "unix".to_string()),
                    ("os.arch".to_string(), "amd64".to_string()),
                    ("probe".to_string(), n.to_string()),
                ]),
                system_properties: BTreeMap::from([(
                    "user.home".to_string(),
                    "/home/ci".to_string(),
                )]),
            })
        }

        fn install_if_necessary(
            &self,
            _artifact: &Artifact,
            _target: &Path,
        ) -> std::result::Result<bool, ChannelError> {
            Ok(false)
        }

        fn exists(&self, _path: &Path) -> std::result::Result<bool, ChannelError> {
            Ok(false)
        }

        fn list_files(&self, _dir: &Path) -> std::result::Result<Vec<String>, ChannelError> {
            Ok(Vec::new())
        }

        fn set_executable(&self, _path: &Path) -> std::result::Result<(), ChannelError> {
            Ok(())
        }

        fn run_script(
            &self,
            script: &Path,
            _base_dir: &Path,
        ) -> std::result::Result<ScriptOutput, ChannelError> {
            Err(ChannelError::Script {
                script: script.to_path_buf(),
                message: "unsupported".to_string(),
            })
        }
    }

    #[test]
    fn custom_contexts_apply_in_order_and_skip_system_properties() {
        let node = Node::new("n1")
            .with_custom_context(CustomContext::default().with("os.arch", "x86_64").with("tier", "bronze"))
            .with_custom_context(CustomContext::default().with("tier", "gold"));
        let channel = FakeChannel::default();

        let ctx = NodeContextService::new().fetch(&node, &channel).unwrap();

        assert_eq!(ctx.attribute("os.arch"), Some("x86_64"));
        assert_eq!(ctx.attribute("tier"), Some("gold"));
        assert_eq!(ctx.attribute("os.family"), Some("unix"));
        assert!(!ctx.system_properties().contains_key("tier"));
        assert_eq!(ctx.node(), "n1");
    }

    #[test]
    fn get_memoizes_per_node() {
        let service = NodeContextService::new();
        let channel = FakeChannel::default();
        let n1 = Node::new("n1");
        let n2 = Node::new("n2");

        let first = service.get(&n1, &channel).unwrap();
        let again = service.get(&n1, &channel).unwrap();
        service.get(&n2, &channel).unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(channel.probes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn offline_forces_fresh_probe() {
        let service = NodeContextService::new();
        let channel = FakeChannel::default();
        let node = Node::new("n1");

        let first = service.get(&node, &channel).unwrap();
        assert!(service.on_offline("n1"));
        let second = service.get(&node, &channel).unwrap();

        assert_eq!(channel.probes.load(Ordering::SeqCst), 2);
        assert_eq!(first.attribute("probe"), Some("1"));
        assert_eq!(second.attribute("probe"), Some("2"));
    }

    #[test]
    fn offline_for_unknown_node_is_noop() {
        let service = NodeContextService::new();
        assert!(!service.on_offline("ghost"));
    }

    #[test]
    fn offline_does_not_wait_for_context_fetch() {
        let service = NodeContextService::new();
        let slot: Slot = Arc::default();
        service
            .slots
            .write()
            .unwrap()
            .insert("n1".to_string(), Arc::clone(&slot));
        let _fetching = slot.lock().unwrap();

        assert!(service.on_offline("n1"));
        assert!(service.cached("n1").is_none());
    }

    #[test]
    fn offline_leaves_other_nodes_cached() {
        let service = NodeContextService::new();
        let channel = FakeChannel::default();
        service.get(&Node::new("n1"), &channel).unwrap();
        service.get(&Node::new("n2"), &channel).unwrap();

        service.on_offline("n1");

        assert!(service.cached("n1").is_none());
        assert!(service.cached("n2").is_some());
    }

    #[test]
    fn failed_probe_is_not_cached() {
        let service = NodeContextService::new();
        let node = Node::new("n1");
        let broken = FakeChannel {
            fail: true,
            ..FakeChannel::default()
        };

        let err = service.get(&node, &broken).unwrap_err();
        assert!(matches!(err, VaultError::Probe { ref node, .. } if node == "n1"));
        assert!(service.cached("n1").is_none());

        let healthy = FakeChannel::default();
        assert!(service.get(&node, &healthy).is_ok());
    }

    #[test]
    fn concurrent_gets_share_one_entry() {
        let service = Arc::new(NodeContextService::new());
        let channel = Arc::new(FakeChannel::default());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                let channel = Arc::clone(&channel);
                std::thread::spawn(move || {
                    let node = Node::new(format!("n{}", i % 2));
                    service.get(&node, channel.as_ref()).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(channel.probes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn describe_lists_attributes() {
        let ctx = NodeContext::from_attributes("n1", [("os.name", "linux"), ("os.arch", "amd64")]);
        assert_eq!(ctx.describe(), "  os.arch=amd64\n  os.name=linux\n");
    }
}
