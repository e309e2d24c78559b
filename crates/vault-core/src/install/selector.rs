//! Package selection: match a node context against package constraints.
//!
//! Selector properties are a conjunction of disjunctions: every key must be
//! reported by the node, and its value must equal (ignoring case) one of the
//! acceptable values for that key. A package without properties matches any
//! node.
//!
//! Candidates are tried most-specific first (more keys first), ties keeping
//! insertion order, so a wildcard package only wins when nothing narrower does.

use crate::catalog::Package;
use crate::error::{Result, VaultError};
use crate::node::NodeContext;
use crate::vault::Vault;

/// True when `context` satisfies every selector key of `pkg`.
pub fn matches(pkg: &Package, context: &NodeContext) -> bool {
    pkg.properties.iter().all(|(key, accepted)| {
        context.attribute(key).is_some_and(|actual| {
            let actual = actual.to_lowercase();
            accepted.iter().any(|value| value.to_lowercase() == actual)
        })
    })
}

/// Packages of a bundle in the order selection evaluates them.
pub fn candidates(packages: &[Package]) -> Vec<&Package> {
    let mut ordered: Vec<&Package> = packages.iter().collect();
    ordered.sort_by_key(|pkg| std::cmp::Reverse(pkg.properties.len()));
    ordered
}

#[derive(Debug, Clone, Copy)]
pub struct PackageSelector<'a> {
    vault: &'a Vault,
}

impl<'a> PackageSelector<'a> {
    pub fn new(vault: &'a Vault) -> Self {
        Self { vault }
    }

    /// The first matching package, with its cache entry built if missing.
    pub fn select(&self, bundle: &str, context: &NodeContext) -> Result<Package> {
        let not_selectable = || VaultError::PackageNotSelectable {
            bundle: bundle.to_string(),
        };

        let Some(found) = self.vault.get_bundle(bundle) else {
            tracing::warn!("No such bundle: {}", bundle);
            return Err(not_selectable());
        };

        let mut pkg = candidates(found.packages())
            .into_iter()
            .find(|pkg| matches(pkg, context))
            .cloned()
            .ok_or_else(not_selectable)?;

        tracing::debug!(
            "Selected package: {} of bundle: {} for node: {}",
            pkg.id(),
            bundle,
            context.node()
        );

        if !pkg.is_cached() {
            tracing::info!("Package cache missing, rebuilding: {} ({})", bundle, pkg.id());
            let file = self
                .vault
                .build_package_cache(bundle, pkg.id())
                .map_err(|source| VaultError::Build {
                    bundle: bundle.to_string(),
                    id: pkg.id().to_string(),
                    source: Box::new(source),
                })?;
            pkg.set_cache_file(Some(file));
        }
        Ok(pkg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::SelectorProperties;
    use crate::catalog::{Bundle, PackageSpec};
    use crate::config::StoreLayout;
    use std::fs;
    use tempfile::TempDir;

    fn pkg(properties: &str) -> Package {
        Package::new(PackageSpec::new("p").with_properties(SelectorProperties::parse(properties)))
    }

    fn linux() -> NodeContext {
        NodeContext::from_attributes(
            "n1",
            [("os.family", "unix"), ("os.name", "Linux"), ("os.arch", "amd64")],
        )
    }

    // =========================================================================
    // Matching
    // =========================================================================

    #[test]
    fn wildcard_matches_any_context() {
        assert!(matches(&pkg(""), &linux()));
        assert!(matches(&pkg(""), &NodeContext::from_attributes("n", Vec::<(String, String)>::new())));
    }

    #[test]
    fn values_within_key_are_alternatives() {
        assert!(matches(&pkg("os.arch=x86\nos.arch=amd64"), &linux()));
        assert!(!matches(&pkg("os.arch=x86\nos.arch=arm64"), &linux()));
    }

    #[test]
    fn every_key_must_match() {
        assert!(matches(&pkg("os.family=unix\nos.arch=amd64"), &linux()));
        assert!(!matches(&pkg("os.family=unix\nos.arch=arm64"), &linux()));
    }

    #[test]
    fn comparison_ignores_case() {
        assert!(matches(&pkg("os.name=linux"), &linux()));
        assert!(matches(&pkg("os.family=UNIX"), &linux()));
    }

    #[test]
    fn absent_attribute_never_matches() {
        assert!(!matches(&pkg("tier=gold"), &linux()));
        assert!(!matches(&pkg("tier"), &linux()));
    }

    #[test]
    fn valueless_key_matches_empty_attribute() {
        let ctx = NodeContext::from_attributes("n", [("tier", "")]);
        assert!(matches(&pkg("tier"), &ctx));
    }

    #[test]
    fn candidates_put_specific_packages_first() {
        let wildcard = pkg("");
        let one = pkg("os.family=unix");
        let two = pkg("os.family=unix\nos.arch=amd64");
        let packages = vec![wildcard.clone(), one.clone(), two.clone()];

        let order: Vec<_> = candidates(&packages).iter().map(|p| p.id()).collect();

        assert_eq!(order, vec![two.id(), one.id(), wildcard.id()]);
    }

    // =========================================================================
    // Selection
    // =========================================================================

    fn vault_with(bundle: Bundle, sources: &[&str]) -> (TempDir, Vault) {
        let temp = TempDir::new().unwrap();
        let vault = Vault::open(StoreLayout::new(temp.path().join("store"))).unwrap();
        for source in sources {
            let dir = vault.layout().root_dir().join(source);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("README"), source).unwrap();
        }
        vault.add_bundle(bundle).unwrap();
        (temp, vault)
    }

    #[test]
    fn wildcard_wins_only_when_nothing_narrower_matches() {
        let windows = Package::new(PackageSpec::new("win").with_property("os.family", "windows"));
        let any = Package::new(PackageSpec::new("any"));
        let unix = Package::new(PackageSpec::new("nix").with_property("os.family", "unix"));
        let (_temp, vault) = vault_with(
            Bundle::new("jdk")
                .with_package(any.clone())
                .with_package(windows)
                .with_package(unix.clone()),
            &["win", "any", "nix"],
        );
        let selector = PackageSelector::new(&vault);

        assert_eq!(selector.select("jdk", &linux()).unwrap().id(), unix.id());

        let mac = NodeContext::from_attributes("n2", [("os.family", "mac")]);
        assert_eq!(selector.select("jdk", &mac).unwrap().id(), any.id());
    }

    #[test]
    fn no_match_names_bundle() {
        let windows = Package::new(PackageSpec::new("win").with_property("os.family", "windows"));
        let (_temp, vault) = vault_with(Bundle::new("jdk").with_package(windows), &["win"]);

        let err = PackageSelector::new(&vault).select("jdk", &linux()).unwrap_err();

        assert!(matches!(err, VaultError::PackageNotSelectable { ref bundle } if bundle == "jdk"));
    }

    #[test]
    fn unknown_bundle_is_not_selectable() {
        let (_temp, vault) = vault_with(Bundle::new("jdk"), &[]);
        let err = PackageSelector::new(&vault).select("ant", &linux()).unwrap_err();
        assert!(matches!(err, VaultError::PackageNotSelectable { .. }));
    }

    #[test]
    fn missing_cache_is_rebuilt() {
        let any = Package::new(PackageSpec::new("any"));
        let (_temp, vault) = vault_with(Bundle::new("jdk").with_package(any.clone()), &["any"]);
        assert!(!vault.cache().exists("jdk", any.id()));

        let selected = PackageSelector::new(&vault).select("jdk", &linux()).unwrap();

        assert!(selected.is_cached());
        assert!(vault.cache().exists("jdk", any.id()));
        assert!(vault.get_bundle("jdk").unwrap().package(any.id()).unwrap().is_cached());
    }

    #[test]
    fn rebuild_failure_is_a_build_error() {
        let any = Package::new(PackageSpec::new("missing"));
        let (_temp, vault) = vault_with(Bundle::new("jdk").with_package(any), &[]);

        let err = PackageSelector::new(&vault).select("jdk", &linux()).unwrap_err();

        match err {
            VaultError::Build { bundle, source, .. } => {
                assert_eq!(bundle, "jdk");
                assert!(matches!(*source, VaultError::SourceNotFound(_)));
            }
            other => panic!("expected build error, got {other:?}"),
        }
    }
}
