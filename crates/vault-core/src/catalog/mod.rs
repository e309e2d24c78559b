//! Bundle and package model.
//!
//! A [`Catalog`] is the in-memory registry of bundles keyed by name. Bundles
//! own their packages; a package's cache file is derived state that is never
//! persisted and must be rebound after loading (see [`Catalog::rehydrate`]).

pub mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attributes::SelectorProperties;

pub use store::CatalogStore;

/// Opaque, generated package identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(Uuid);

impl PackageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the textual form; `None` if it is not a valid identifier.
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text.trim()).ok().map(Self)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Editable package configuration, used to create or update a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSpec {
    pub path: String,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub properties: SelectorProperties,
    pub description: Option<String>,
}

impl PackageSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_includes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.includes = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excludes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_properties(mut self, properties: SelectorProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key, value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One archivable unit of a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    id: PackageId,
    /// Source directory relative to the vault root.
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    #[serde(default, skip_serializing_if = "SelectorProperties::is_empty")]
    pub properties: SelectorProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    cache_file: Option<PathBuf>,
}

impl Package {
    /// Create a package with a freshly generated identifier.
    pub fn new(spec: PackageSpec) -> Self {
        let mut pkg = Self {
            id: PackageId::generate(),
            path: String::new(),
            includes: Vec::new(),
            excludes: Vec::new(),
            properties: SelectorProperties::new(),
            description: None,
            cache_file: None,
        };
        pkg.apply(spec);
        pkg
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    /// Replace the editable configuration, keeping identity.
    pub fn apply(&mut self, spec: PackageSpec) {
        self.path = spec.path;
        self.includes = spec.includes;
        self.excludes = spec.excludes;
        self.properties = spec.properties;
        self.description = spec.description;
    }

    pub fn spec(&self) -> PackageSpec {
        PackageSpec {
            path: self.path.clone(),
            includes: self.includes.clone(),
            excludes: self.excludes.clone(),
            properties: self.properties.clone(),
            description: self.description.clone(),
        }
    }

    pub fn cache_file(&self) -> Option<&Path> {
        self.cache_file.as_deref()
    }

    pub(crate) fn set_cache_file(&mut self, file: Option<PathBuf>) {
        self.cache_file = file;
    }

    /// True when the cache handle is bound and the archive is on disk.
    pub fn is_cached(&self) -> bool {
        self.cache_file.as_deref().is_some_and(Path::is_file)
    }
}

/// Named collection of packages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    packages: Vec<Package>,
}

impl Bundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            description: None,
            packages: Vec::new(),
        }
    }

    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder form of [`Bundle::add_package`].
    pub fn with_package(mut self, pkg: Package) -> Self {
        self.add_package(pkg);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Packages in insertion order.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn package(&self, id: PackageId) -> Option<&Package> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub(crate) fn package_mut(&mut self, id: PackageId) -> Option<&mut Package> {
        self.packages.iter_mut().find(|p| p.id == id)
    }

    pub(crate) fn packages_mut(&mut self) -> impl Iterator<Item = &mut Package> {
        self.packages.iter_mut()
    }

    /// Add a package; a package with the same id is replaced.
    pub fn add_package(&mut self, pkg: Package) {
        match self.packages.iter_mut().find(|p| p.id == pkg.id) {
            Some(existing) => *existing = pkg,
            None => self.packages.push(pkg),
        }
    }

    pub fn remove_package(&mut self, id: PackageId) -> Option<Package> {
        let index = self.packages.iter().position(|p| p.id == id)?;
        Some(self.packages.remove(index))
    }

    /// A new bundle identity carrying this bundle's contents.
    pub fn renamed(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }
}

impl PartialEq for Bundle {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Bundle {}

impl PartialOrd for Bundle {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bundle {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// Registry of bundles keyed by unique, case-sensitive name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    bundles: BTreeMap<String, Bundle>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bundles(bundles: impl IntoIterator<Item = Bundle>) -> Self {
        Self {
            bundles: bundles
                .into_iter()
                .map(|b| (b.name.clone(), b))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Bundle> {
        self.bundles.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Bundle> {
        self.bundles.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bundles.contains_key(name)
    }

    /// Bundles in lexicographic name order.
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.values()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Insert a bundle; returns false and leaves the catalog unchanged on a name clash.
    pub(crate) fn insert(&mut self, bundle: Bundle) -> bool {
        if self.bundles.contains_key(&bundle.name) {
            return false;
        }
        self.bundles.insert(bundle.name.clone(), bundle);
        true
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Bundle> {
        self.bundles.remove(name)
    }

    /// Recompute every derived cache handle from (bundle name, package id).
    pub fn rehydrate(&mut self, cache_file: impl Fn(&str, PackageId) -> PathBuf) {
        for bundle in self.bundles.values_mut() {
            let name = bundle.name.clone();
            for pkg in bundle.packages_mut() {
                pkg.set_cache_file(Some(cache_file(&name, pkg.id)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_ids_are_unique() {
        let a = Package::new(PackageSpec::new("jdk/linux"));
        let b = Package::new(PackageSpec::new("jdk/linux"));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn package_id_parses_its_display_form() {
        let id = PackageId::generate();
        assert_eq!(PackageId::parse(&id.to_string()), Some(id));
        assert_eq!(PackageId::parse("not-an-id"), None);
    }

    #[test]
    fn apply_keeps_identity() {
        let mut pkg = Package::new(PackageSpec::new("old"));
        let id = pkg.id();
        pkg.apply(PackageSpec::new("new").with_property("os.family", "unix"));

        assert_eq!(pkg.id(), id);
        assert_eq!(pkg.path, "new");
        assert!(pkg.properties.get("os.family").is_some());
    }

    #[test]
    fn add_package_replaces_same_id() {
        let pkg = Package::new(PackageSpec::new("a"));
        let id = pkg.id();
        let mut bundle = Bundle::new("jdk").with_package(pkg.clone());

        let mut edited = pkg;
        edited.path = "b".to_string();
        bundle.add_package(edited);

        assert_eq!(bundle.packages().len(), 1);
        assert_eq!(bundle.package(id).unwrap().path, "b");
    }

    #[test]
    fn with_package_keeps_ids_unique() {
        let pkg = Package::new(PackageSpec::new("a"));
        let id = pkg.id();
        let mut edited = pkg.clone();
        edited.path = "b".to_string();

        let mut bundle = Bundle::new("jdk").with_package(pkg).with_package(edited);

        assert_eq!(bundle.packages().len(), 1);
        assert_eq!(bundle.package(id).unwrap().path, "b");
        assert!(bundle.remove_package(id).is_some());
        assert!(bundle.package(id).is_none());
    }

    #[test]
    fn renamed_keeps_contents() {
        let bundle = Bundle::new("jdk")
            .with_type("jdk")
            .with_description("Java")
            .with_package(Package::new(PackageSpec::new("jdk")));

        let renamed = bundle.renamed("java");
        assert_eq!(renamed.name(), "java");
        assert_eq!(renamed.kind.as_deref(), Some("jdk"));
        assert_eq!(renamed.description.as_deref(), Some("Java"));
        assert_eq!(renamed.packages().len(), 1);
    }

    #[test]
    fn catalog_rejects_duplicate_names() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert(Bundle::new("jdk").with_type("a")));
        assert!(!catalog.insert(Bundle::new("jdk").with_type("b")));
        assert_eq!(catalog.get("jdk").unwrap().kind.as_deref(), Some("a"));
    }

    #[test]
    fn catalog_names_are_case_sensitive() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert(Bundle::new("jdk")));
        assert!(catalog.insert(Bundle::new("JDK")));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn catalog_enumerates_by_name() {
        let catalog = Catalog::from_bundles([Bundle::new("maven"), Bundle::new("ant"), Bundle::new("jdk")]);
        let names: Vec<_> = catalog.bundles().map(Bundle::name).collect();
        assert_eq!(names, vec!["ant", "jdk", "maven"]);
    }

    #[test]
    fn rehydrate_binds_cache_handles() {
        let pkg = Package::new(PackageSpec::new("jdk"));
        let id = pkg.id();
        let mut catalog = Catalog::from_bundles([Bundle::new("jdk").with_package(pkg)]);

        catalog.rehydrate(|bundle, id| PathBuf::from(format!("/cache/{bundle},{id}.zip")));

        let pkg = catalog.get("jdk").unwrap().package(id).unwrap();
        assert_eq!(
            pkg.cache_file(),
            Some(PathBuf::from(format!("/cache/jdk,{id}.zip")).as_path())
        );
        // Bound but not on disk.
        assert!(!pkg.is_cached());
    }

    #[test]
    fn cache_handle_is_not_serialized() {
        let mut pkg = Package::new(PackageSpec::new("jdk").with_property("os.family", "unix"));
        pkg.set_cache_file(Some(PathBuf::from("/cache/x.zip")));

        let json = serde_json::to_string(&pkg).unwrap();
        assert!(!json.contains("cache"));

        let back: Package = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), pkg.id());
        assert!(back.cache_file().is_none());
    }
}
