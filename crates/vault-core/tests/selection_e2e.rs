//! Selection against a populated vault: OS variants, wildcards, rename.

mod support;

use std::fs;

use support::Fixture;
use vault_core::VaultError;
use vault_core::catalog::{Bundle, PackageSpec};
use vault_core::install::PackageSelector;
use vault_core::node::NodeContext;

fn linux_context() -> NodeContext {
    NodeContext::from_attributes(
        "linux-01",
        [("os.family", "linux"), ("os.arch", "amd64")],
    )
}

#[test]
fn wildcard_package_serves_unmatched_platform() {
    let fixture = Fixture::new();
    fixture.source("jdk/windows", &[("bin/java.exe", "win")]);
    fixture.source("jdk/any", &[("bin/java", "any")]);
    fixture.vault.add_bundle(Bundle::new("jdk").with_type("jdk")).unwrap();
    let windows = fixture
        .vault
        .add_package(
            "jdk",
            PackageSpec::new("jdk/windows").with_property("os.family", "windows"),
        )
        .unwrap();
    let wildcard = fixture.vault.add_package("jdk", PackageSpec::new("jdk/any")).unwrap();

    let selected = PackageSelector::new(&fixture.vault)
        .select("jdk", &linux_context())
        .expect("selection should succeed");

    assert_eq!(selected.id(), wildcard);
    assert_ne!(selected.id(), windows);
}

#[test]
fn alternatives_and_conjunction_across_keys() {
    let fixture = Fixture::new();
    fixture.source("tool/x86", &[("tool", "x86")]);
    fixture.source("tool/arm", &[("tool", "arm")]);
    fixture.vault.add_bundle(Bundle::new("tool")).unwrap();
    let x86 = fixture
        .vault
        .add_package(
            "tool",
            PackageSpec::new("tool/x86")
                .with_property("os.family", "linux")
                .with_property("os.arch", "x86")
                .with_property("os.arch", "AMD64"),
        )
        .unwrap();
    fixture
        .vault
        .add_package(
            "tool",
            PackageSpec::new("tool/arm")
                .with_property("os.family", "linux")
                .with_property("os.arch", "aarch64"),
        )
        .unwrap();
    let selector = PackageSelector::new(&fixture.vault);

    assert_eq!(selector.select("tool", &linux_context()).unwrap().id(), x86);

    let riscv = NodeContext::from_attributes("rv", [("os.family", "linux"), ("os.arch", "riscv64")]);
    assert!(matches!(
        selector.select("tool", &riscv).unwrap_err(),
        VaultError::PackageNotSelectable { ref bundle } if bundle == "tool"
    ));
}

#[test]
fn rename_evicts_and_selection_rebuilds_under_new_name() {
    let fixture = Fixture::new();
    fixture.source("jdk", &[("release", "17")]);
    fixture.vault.add_bundle(Bundle::new("jdk")).unwrap();
    let id = fixture.vault.add_package("jdk", PackageSpec::new("jdk")).unwrap();
    let old_entry = fixture.vault.cache().entry_path("jdk", id);
    assert!(old_entry.is_file());

    fixture.vault.rename_bundle("jdk", "java").unwrap();

    assert!(fixture.vault.get_bundle("jdk").is_none());
    assert!(fixture.vault.get_bundle("java").is_some());
    assert!(!old_entry.exists());

    let selected = PackageSelector::new(&fixture.vault)
        .select("java", &linux_context())
        .unwrap();

    let new_entry = fixture.vault.cache().entry_path("java", id);
    assert_eq!(selected.cache_file(), Some(new_entry.as_path()));
    assert!(new_entry.is_file());
    assert!(!old_entry.exists());
}

#[test]
fn removed_cache_is_rebuilt_from_current_source() {
    let fixture = Fixture::new();
    let source = fixture.source("maven", &[("v1.txt", "1")]);
    fixture.vault.add_bundle(Bundle::new("maven")).unwrap();
    let id = fixture.vault.add_package("maven", PackageSpec::new("maven")).unwrap();

    fixture.vault.remove_package_cache("maven", id).unwrap();
    fs::remove_file(source.join("v1.txt")).unwrap();
    fs::write(source.join("v2.txt"), "2").unwrap();

    let selected = PackageSelector::new(&fixture.vault)
        .select("maven", &linux_context())
        .unwrap();

    let file = fs::File::open(selected.cache_file().unwrap()).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    assert_eq!(archive.file_names().collect::<Vec<_>>(), vec!["v2.txt"]);
}

#[test]
fn catalog_survives_restart_with_selectors() {
    let fixture = Fixture::new();
    fixture.source("jdk/win", &[("java.exe", "")]);
    fixture.vault.add_bundle(Bundle::new("jdk")).unwrap();
    let id = fixture
        .vault
        .add_package(
            "jdk",
            PackageSpec::new("jdk/win")
                .with_property("os.family", "windows")
                .with_includes(["**/*.exe"]),
        )
        .unwrap();

    let reopened = fixture.reopen();
    let bundle = reopened.get_bundle("jdk").unwrap();
    let pkg = bundle.package(id).unwrap();

    assert_eq!(pkg.path, "jdk/win");
    assert_eq!(pkg.includes, vec!["**/*.exe"]);
    assert!(pkg.properties.get("os.family").unwrap().contains("windows"));
    assert!(pkg.is_cached());
}
