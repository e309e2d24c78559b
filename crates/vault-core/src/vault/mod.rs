//! The vault: catalog, artifact cache and store areas as one service.
//!
//! A `Vault` is constructed once by the composition root and shared by
//! handle (`Arc<Vault>`). Catalog mutations are applied to a copy, persisted,
//! then committed, so a failed save leaves the in-memory catalog unchanged.
//! Cache evictions that follow a catalog change are best-effort.

pub mod uploads;

use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::cache::{ArtifactCache, FileFilter};
use crate::catalog::{Bundle, Catalog, CatalogStore, Package, PackageId, PackageSpec};
use crate::config::StoreLayout;
use crate::error::{Result, VaultError};

pub use uploads::{UploadedFile, Uploads};

/// Editable bundle fields; a different `name` renames the bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleUpdate {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct Vault {
    layout: StoreLayout,
    store: CatalogStore,
    cache: ArtifactCache,
    catalog: RwLock<Catalog>,
}

impl Vault {
    /// Load the persisted catalog (or start empty) and rebind derived state.
    pub fn open(layout: StoreLayout) -> Result<Self> {
        let store = CatalogStore::new(layout.catalog_path());
        let mut catalog = store.load()?;
        catalog.rehydrate(|bundle, id| layout.cache_file(bundle, id));

        tracing::info!("Storage directory: {}", layout.store_dir().display());

        Ok(Self {
            cache: ArtifactCache::new(layout.clone()),
            store,
            layout,
            catalog: RwLock::new(catalog),
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn uploads(&self) -> Uploads {
        Uploads::new(self.layout.uploads_dir())
    }

    /// Persist the current catalog.
    pub fn save(&self) -> Result<()> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        self.store.save(&catalog)
    }

    /// Run `f` against the catalog under a shared lock.
    pub fn with_catalog<R>(&self, f: impl FnOnce(&Catalog) -> R) -> R {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        f(&catalog)
    }

    /// All bundles, ordered by name.
    pub fn bundles(&self) -> Vec<Bundle> {
        self.with_catalog(|c| c.bundles().cloned().collect())
    }

    pub fn get_bundle(&self, name: &str) -> Option<Bundle> {
        self.with_catalog(|c| c.get(name).cloned())
    }

    /// Bundles whose type equals `kind` exactly, or all bundles if unset.
    pub fn find_bundles(&self, kind: Option<&str>) -> Vec<Bundle> {
        self.with_catalog(|c| {
            c.bundles()
                .filter(|b| kind.is_none() || b.kind.as_deref() == kind)
                .cloned()
                .collect()
        })
    }

    pub fn add_bundle(&self, bundle: Bundle) -> Result<Bundle> {
        tracing::info!("Creating bundle: {}", bundle.name());

        let name = bundle.name().to_string();
        self.mutate(|catalog| {
            let mut bundle = bundle;
            for pkg in bundle.packages_mut() {
                pkg.set_cache_file(Some(self.layout.cache_file(&name, pkg.id())));
            }
            if !catalog.insert(bundle.clone()) {
                return Err(VaultError::DuplicateBundle(name.clone()));
            }
            Ok(bundle)
        })
    }

    /// Remove a bundle and evict every cache entry of its packages.
    pub fn remove_bundle(&self, name: &str) -> Result<Bundle> {
        tracing::info!("Removing bundle: {}", name);

        let removed = self.mutate(|catalog| {
            catalog
                .remove(name)
                .ok_or_else(|| VaultError::NoSuchBundle(name.to_string()))
        })?;

        for pkg in removed.packages() {
            self.evict(name, pkg.id());
        }
        Ok(removed)
    }

    /// Replace the bundle's identity and evict its cache entries.
    ///
    /// Entries are rebuilt lazily under the new name on next selection.
    pub fn rename_bundle(&self, source: &str, target: &str) -> Result<()> {
        tracing::info!("Renaming bundle: {} -> {}", source, target);

        let ids = self.mutate(|catalog| self.rename_in(catalog, source, target))?;
        for id in ids {
            self.evict(source, id);
            self.evict(target, id);
        }
        Ok(())
    }

    /// Edit type and description; rename when `update.name` differs.
    pub fn update_bundle(&self, name: &str, update: BundleUpdate) -> Result<Bundle> {
        let target = update.name.clone().filter(|n| n != name);

        let (bundle, renamed) = self.mutate(|catalog| {
            let bundle = catalog
                .get_mut(name)
                .ok_or_else(|| VaultError::NoSuchBundle(name.to_string()))?;
            bundle.kind = update.kind.clone();
            bundle.description = update.description.clone();

            match &target {
                Some(target) => {
                    let ids = self.rename_in(catalog, name, target)?;
                    let bundle = catalog.get(target).cloned();
                    Ok((bundle, ids))
                }
                None => Ok((catalog.get(name).cloned(), Vec::new())),
            }
        })?;

        if let Some(target) = &target {
            tracing::info!("Renamed bundle: {} -> {}", name, target);
            for id in renamed {
                self.evict(name, id);
                self.evict(target, id);
            }
        }
        bundle.ok_or_else(|| VaultError::NoSuchBundle(name.to_string()))
    }

    /// Create a package in `bundle` and build its cache.
    ///
    /// The package stays registered when the build fails; the build error is
    /// returned and selection retries the build later.
    pub fn add_package(&self, bundle: &str, spec: PackageSpec) -> Result<PackageId> {
        self.validate(&spec)?;
        let id = self.mutate(|catalog| {
            let target = catalog
                .get_mut(bundle)
                .ok_or_else(|| VaultError::NoSuchBundle(bundle.to_string()))?;
            let mut pkg = Package::new(spec);
            pkg.set_cache_file(Some(self.layout.cache_file(bundle, pkg.id())));
            let id = pkg.id();
            target.add_package(pkg);
            Ok(id)
        })?;

        tracing::info!("Created package: {} in bundle: {}", id, bundle);
        self.build_package_cache(bundle, id)?;
        Ok(id)
    }

    /// Replace a package's configuration and rebuild its cache.
    ///
    /// An invalid path or pattern is rejected before the catalog changes. A
    /// build failure after the commit leaves the package without a cache.
    pub fn update_package(&self, bundle: &str, id: PackageId, spec: PackageSpec) -> Result<PathBuf> {
        self.validate(&spec)?;
        self.cache.locked(bundle, id, || {
            self.mutate(|catalog| {
                let pkg = Self::package_in(catalog, bundle, id)?;
                pkg.apply(spec);
                Ok(())
            })?;
            self.build_locked(bundle, id)
        })
    }

    pub fn remove_package(&self, bundle: &str, id: PackageId) -> Result<Package> {
        let removed = self.mutate(|catalog| {
            catalog
                .get_mut(bundle)
                .ok_or_else(|| VaultError::NoSuchBundle(bundle.to_string()))?
                .remove_package(id)
                .ok_or_else(|| VaultError::NoSuchPackage {
                    bundle: bundle.to_string(),
                    id: id.to_string(),
                })
        })?;
        self.evict(bundle, id);
        Ok(removed)
    }

    /// Rebuild a package's cache from its current source.
    pub fn refresh_package(&self, bundle: &str, id: PackageId) -> Result<PathBuf> {
        self.build_package_cache(bundle, id)
    }

    /// Archive the package source into its cache entry, replacing any prior
    /// entry, and bind the entry to the package.
    ///
    /// The package is read under the entry's key lock, so a build never
    /// publishes a configuration that an update has already replaced.
    pub fn build_package_cache(&self, bundle: &str, id: PackageId) -> Result<PathBuf> {
        self.cache.locked(bundle, id, || self.build_locked(bundle, id))
    }

    fn build_locked(&self, bundle: &str, id: PackageId) -> Result<PathBuf> {
        let pkg = self.with_catalog(|catalog| {
            catalog
                .get(bundle)
                .ok_or_else(|| VaultError::NoSuchBundle(bundle.to_string()))?
                .package(id)
                .cloned()
                .ok_or_else(|| VaultError::NoSuchPackage {
                    bundle: bundle.to_string(),
                    id: id.to_string(),
                })
        })?;

        let built = self
            .resolve_path(&pkg.path)
            .and_then(|source| self.cache.build_entry(bundle, &pkg, &source))
            .and_then(|file| {
                // The bundle may have been renamed or removed meanwhile.
                self.bind_cache_file(bundle, id, Some(file.clone()))?;
                Ok(file)
            });
        if built.is_err() {
            self.discard_locked(bundle, id);
        }
        built
    }

    /// Delete the package's cache entry if present and clear its handle.
    ///
    /// Returns whether an entry was removed; removing an absent entry is a no-op.
    pub fn remove_package_cache(&self, bundle: &str, id: PackageId) -> Result<bool> {
        self.cache.locked(bundle, id, || {
            let removed = self.cache.remove_entry(bundle, id);
            let _ = self.bind_cache_file(bundle, id, None);
            removed
        })
    }

    /// Resolve a package path against the vault root. A leading `/` is ignored.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches(['/', '\\']));
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(VaultError::InvalidPath(path.to_string()));
        }
        Ok(self.layout.root_dir().join(relative))
    }

    /// Unpack a staged upload into a vault-relative path.
    pub fn extract_upload(&self, name: &str, path: &str) -> Result<usize> {
        let target = self.resolve_path(path)?;
        self.uploads().extract(name, &target)
    }

    /// Reject paths outside the vault root and malformed patterns.
    fn validate(&self, spec: &PackageSpec) -> Result<()> {
        self.resolve_path(&spec.path)?;
        FileFilter::new(&spec.includes, &spec.excludes)?;
        Ok(())
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Catalog) -> Result<R>) -> Result<R> {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = catalog.clone();
        let result = f(&mut next)?;
        self.store.save(&next)?;
        *catalog = next;
        Ok(result)
    }

    fn rename_in(&self, catalog: &mut Catalog, source: &str, target: &str) -> Result<Vec<PackageId>> {
        if !catalog.contains(source) {
            return Err(VaultError::NoSuchBundle(source.to_string()));
        }
        if catalog.contains(target) {
            return Err(VaultError::DuplicateBundle(target.to_string()));
        }

        let mut bundle = catalog
            .remove(source)
            .ok_or_else(|| VaultError::NoSuchBundle(source.to_string()))?
            .renamed(target);
        for pkg in bundle.packages_mut() {
            pkg.set_cache_file(Some(self.layout.cache_file(target, pkg.id())));
        }
        let ids = bundle.packages().iter().map(Package::id).collect();
        catalog.insert(bundle);
        Ok(ids)
    }

    fn package_in<'a>(catalog: &'a mut Catalog, bundle: &str, id: PackageId) -> Result<&'a mut Package> {
        catalog
            .get_mut(bundle)
            .ok_or_else(|| VaultError::NoSuchBundle(bundle.to_string()))?
            .package_mut(id)
            .ok_or_else(|| VaultError::NoSuchPackage {
                bundle: bundle.to_string(),
                id: id.to_string(),
            })
    }

    fn bind_cache_file(&self, bundle: &str, id: PackageId, file: Option<PathBuf>) -> Result<()> {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        Self::package_in(&mut catalog, bundle, id)?.set_cache_file(file);
        Ok(())
    }

    /// Drop a failed or orphaned entry; the caller holds the key lock.
    fn discard_locked(&self, bundle: &str, id: PackageId) {
        if let Err(e) = self.cache.remove_entry(bundle, id) {
            tracing::error!("Failed to remove cache for {} ({}): {}", bundle, id, e);
        }
        let _ = self.bind_cache_file(bundle, id, None);
    }

    /// Delete a cache entry, leaving any bound handle in place.
    fn evict(&self, bundle: &str, id: PackageId) {
        if let Err(e) = self.cache.remove(bundle, id) {
            tracing::error!("Failed to remove cache for {} ({}): {}", bundle, id, e);
        }
    }
}
