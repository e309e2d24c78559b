//! Vault - bundle distribution for worker nodes
//!
//! Usage:
//!   vault bundle add jdk --type jdk
//!   vault package add jdk jdk/linux --property os.family=unix
//!   vault install jdk ./tools/jdk
//!   vault online              # run configured node-online installs

mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vault_core::attributes::SelectorProperties;
use vault_core::catalog::{Bundle, PackageId, PackageSpec};
use vault_core::config::{ConfigStore, VaultConfig};
use vault_core::install::{InstallEntry, NodeLifecycle, OnlineInstaller, PackageInstaller};
use vault_core::node::{CustomContext, LocalChannel, Node, NodeContextService};
use vault_core::vault::{BundleUpdate, Vault};

use crate::output::{ConsoleListener, print_bundle, print_bundle_line};

#[derive(Parser)]
#[command(name = "vault")]
#[command(about = "Distribute platform-specific bundles to nodes", long_about = None)]
struct Cli {
    /// Path to vault.toml (default: <config dir>/vault/vault.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store directory, overriding [store] dir
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage bundles
    Bundle(BundleArgs),

    /// Manage packages of a bundle
    Package(PackageArgs),

    /// Build or drop package caches
    Cache(CacheArgs),

    /// Manage staged uploads
    Upload(UploadArgs),

    /// Print the local node context
    Context,

    /// Install a bundle on the local node
    Install {
        /// Bundle name
        bundle: String,
        /// Install location
        location: PathBuf,
        /// Skip the post-install script
        #[arg(long)]
        no_script: bool,
    },

    /// Run the configured node-online installs for the local node
    Online,
}

#[derive(Args)]
struct BundleArgs {
    #[command(subcommand)]
    command: BundleCommand,
}

#[derive(Subcommand)]
enum BundleCommand {
    /// Create a bundle
    Add {
        name: String,
        #[arg(long = "type", short = 't')]
        kind: Option<String>,
        #[arg(long, short)]
        description: Option<String>,
    },

    /// Remove a bundle and its package caches
    #[command(alias = "rm")]
    Remove { name: String },

    /// Rename a bundle; its caches are rebuilt on next use
    Rename { from: String, to: String },

    /// Edit type and description, or rename with --name
    Update {
        name: String,
        /// New bundle name
        #[arg(long = "name", value_name = "NAME")]
        name_to: Option<String>,
        #[arg(long = "type", short = 't')]
        kind: Option<String>,
        #[arg(long, short)]
        description: Option<String>,
    },

    /// List bundles
    #[command(alias = "ls")]
    List {
        /// Only bundles of this type (exact match)
        #[arg(long = "type", short = 't')]
        kind: Option<String>,
    },

    /// Show a bundle and its packages
    Show { name: String },
}

#[derive(Args)]
struct PackageArgs {
    #[command(subcommand)]
    command: PackageCommand,
}

#[derive(Args)]
struct PackageOptions {
    /// Include globs (comma or whitespace separated, repeatable)
    #[arg(long = "include", value_name = "GLOB")]
    includes: Vec<String>,

    /// Exclude globs (comma or whitespace separated, repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    excludes: Vec<String>,

    /// Selector property (repeatable; repeat a key for alternatives)
    #[arg(long = "property", short = 'p', value_name = "KEY=VALUE")]
    properties: Vec<String>,

    /// Selector properties as attribute text, one key=value per line
    #[arg(long, value_name = "TEXT")]
    properties_text: Option<String>,

    #[arg(long, short)]
    description: Option<String>,
}

impl PackageOptions {
    fn has_properties(&self) -> bool {
        !self.properties.is_empty() || self.properties_text.is_some()
    }

    fn selector(&self) -> SelectorProperties {
        let mut text = self.properties_text.clone().unwrap_or_default();
        for line in &self.properties {
            text.push('\n');
            text.push_str(line);
        }
        SelectorProperties::parse(&text)
    }

    /// Overlay the given options on `spec`; unset options keep their value.
    fn apply(self, mut spec: PackageSpec) -> PackageSpec {
        if self.has_properties() {
            spec.properties = self.selector();
        }
        if !self.includes.is_empty() {
            spec.includes = self.includes;
        }
        if !self.excludes.is_empty() {
            spec.excludes = self.excludes;
        }
        if self.description.is_some() {
            spec.description = self.description;
        }
        spec
    }
}

#[derive(Subcommand)]
enum PackageCommand {
    /// Add a package and build its cache
    Add {
        bundle: String,
        /// Source directory relative to the vault root
        path: String,
        #[command(flatten)]
        options: PackageOptions,
    },

    /// Change a package and rebuild its cache
    Update {
        bundle: String,
        id: String,
        /// New source directory
        #[arg(long)]
        path: Option<String>,
        #[command(flatten)]
        options: PackageOptions,
    },

    /// Remove a package
    #[command(alias = "rm")]
    Remove { bundle: String, id: String },

    /// Rebuild a package cache from its current source
    Refresh { bundle: String, id: String },
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Build the cache of a package
    Build { bundle: String, id: String },
    /// Remove the cache of a package
    Remove { bundle: String, id: String },
}

#[derive(Args)]
struct UploadArgs {
    #[command(subcommand)]
    command: UploadCommand,
}

#[derive(Subcommand)]
enum UploadCommand {
    /// Stage a file
    Add { file: PathBuf },
    /// List staged files
    #[command(alias = "ls")]
    List,
    /// Delete a staged file
    #[command(alias = "rm")]
    Remove { name: String },
    /// Unpack a staged zip to a path under the vault root
    Extract { name: String, path: String },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let app = App::load(cli.config, cli.store)?;

    match cli.command {
        Commands::Bundle(args) => app.run_bundle(args.command),
        Commands::Package(args) => app.run_package(args.command),
        Commands::Cache(args) => app.run_cache(args.command),
        Commands::Upload(args) => app.run_upload(args.command),
        Commands::Context => app.run_context(),
        Commands::Install {
            bundle,
            location,
            no_script,
        } => app.run_install(bundle, location, no_script),
        Commands::Online => app.run_online(),
    }
}

/// Composition root: one vault and one context service per process.
struct App {
    config: VaultConfig,
    vault: Arc<Vault>,
    contexts: Arc<NodeContextService>,
}

impl App {
    fn load(config_path: Option<PathBuf>, store: Option<PathBuf>) -> Result<Self> {
        let config_store = match config_path {
            Some(path) => ConfigStore::from_path(path),
            None => ConfigStore::from_default()?,
        };
        let mut config = config_store.load()?;
        if let Some(dir) = store {
            config.store.dir = Some(dir);
        }

        let layout = config.layout()?;
        let vault = Vault::open(layout).context("Failed to open vault")?;
        Ok(Self {
            config,
            vault: Arc::new(vault),
            contexts: Arc::new(NodeContextService::new()),
        })
    }

    fn run_bundle(&self, command: BundleCommand) -> Result<()> {
        match command {
            BundleCommand::Add {
                name,
                kind,
                description,
            } => {
                let mut bundle = Bundle::new(name);
                bundle.kind = kind;
                bundle.description = description;
                let bundle = self.vault.add_bundle(bundle)?;
                println!("{} Created bundle {}", style("✓").green(), bundle.name());
            }
            BundleCommand::Remove { name } => {
                let removed = self.vault.remove_bundle(&name)?;
                println!(
                    "{} Removed bundle {} ({} package(s))",
                    style("✓").green(),
                    removed.name(),
                    removed.packages().len()
                );
            }
            BundleCommand::Rename { from, to } => {
                self.vault.rename_bundle(&from, &to)?;
                println!("{} Renamed bundle {} -> {}", style("✓").green(), from, to);
            }
            BundleCommand::Update {
                name,
                name_to,
                kind,
                description,
            } => {
                let current = self
                    .vault
                    .get_bundle(&name)
                    .ok_or_else(|| anyhow::anyhow!("No such bundle: {}", name))?;
                let update = BundleUpdate {
                    name: name_to,
                    kind: kind.or(current.kind),
                    description: description.or(current.description),
                };
                let bundle = self.vault.update_bundle(&name, update)?;
                println!("{} Updated bundle {}", style("✓").green(), bundle.name());
            }
            BundleCommand::List { kind } => {
                let bundles = self.vault.find_bundles(kind.as_deref());
                if bundles.is_empty() {
                    println!("No bundles");
                }
                for bundle in &bundles {
                    print_bundle_line(bundle);
                }
            }
            BundleCommand::Show { name } => {
                let bundle = self
                    .vault
                    .get_bundle(&name)
                    .ok_or_else(|| anyhow::anyhow!("No such bundle: {}", name))?;
                print_bundle(&bundle);
            }
        }
        Ok(())
    }

    fn run_package(&self, command: PackageCommand) -> Result<()> {
        match command {
            PackageCommand::Add {
                bundle,
                path,
                options,
            } => {
                let spec = options.apply(PackageSpec::new(path));
                let id = self.vault.add_package(&bundle, spec)?;
                println!("{} Added package {} to {}", style("✓").green(), id, bundle);
            }
            PackageCommand::Update {
                bundle,
                id,
                path,
                options,
            } => {
                let id = parse_id(&id)?;
                let current = self
                    .vault
                    .get_bundle(&bundle)
                    .and_then(|b| b.package(id).map(|p| p.spec()))
                    .ok_or_else(|| anyhow::anyhow!("No such package: {} in bundle: {}", id, bundle))?;
                let mut spec = options.apply(current);
                if let Some(path) = path {
                    spec.path = path;
                }
                let file = self.vault.update_package(&bundle, id, spec)?;
                println!("{} Rebuilt {}", style("✓").green(), file.display());
            }
            PackageCommand::Remove { bundle, id } => {
                let pkg = self.vault.remove_package(&bundle, parse_id(&id)?)?;
                println!("{} Removed package {}", style("✓").green(), pkg.id());
            }
            PackageCommand::Refresh { bundle, id } => {
                let file = self.vault.refresh_package(&bundle, parse_id(&id)?)?;
                println!("{} Rebuilt {}", style("✓").green(), file.display());
            }
        }
        Ok(())
    }

    fn run_cache(&self, command: CacheCommand) -> Result<()> {
        match command {
            CacheCommand::Build { bundle, id } => {
                let file = self.vault.build_package_cache(&bundle, parse_id(&id)?)?;
                println!("{} Built {}", style("✓").green(), file.display());
            }
            CacheCommand::Remove { bundle, id } => {
                if self.vault.remove_package_cache(&bundle, parse_id(&id)?)? {
                    println!("{} Removed cache", style("✓").green());
                } else {
                    println!("No cache to remove");
                }
            }
        }
        Ok(())
    }

    fn run_upload(&self, command: UploadCommand) -> Result<()> {
        let uploads = self.vault.uploads();
        match command {
            UploadCommand::Add { file } => {
                let staged = uploads.stage(&file)?;
                println!("{} Staged {} ({} bytes)", style("✓").green(), staged.name, staged.size);
            }
            UploadCommand::List => {
                let files = uploads.list()?;
                if files.is_empty() {
                    println!("No uploads");
                }
                for file in files {
                    println!("  {:<32} {:>12}", style(&file.name).green(), file.size);
                }
            }
            UploadCommand::Remove { name } => {
                uploads.remove(&name)?;
                println!("{} Removed upload {}", style("✓").green(), name);
            }
            UploadCommand::Extract { name, path } => {
                let count = self.vault.extract_upload(&name, &path)?;
                println!("{} Extracted {} file(s) to {}", style("✓").green(), count, path);
            }
        }
        Ok(())
    }

    fn run_context(&self) -> Result<()> {
        let node = self.local_node()?;
        let channel = LocalChannel::new();
        let context = self.contexts.get(&node, &channel)?;
        println!("{}", style(format!("Node: {}", context.node())).bold());
        print!("{}", context.describe());
        Ok(())
    }

    fn run_install(&self, bundle: String, location: PathBuf, no_script: bool) -> Result<()> {
        let mut installer = PackageInstaller::new(Arc::clone(&self.vault), Arc::clone(&self.contexts))
            .with_bundle(bundle.clone())
            .with_location(location)
            .with_node(self.local_node()?)
            .with_listener(Arc::new(ConsoleListener));
        if no_script {
            installer = installer.with_hooks(Vec::new());
        }

        let outcome = installer.install()?;
        if outcome.installed {
            println!(
                "{} Installed {} to {}",
                style("✓").green(),
                bundle,
                outcome.location.display()
            );
        } else {
            println!("{} {} is up to date", style("✓").green(), bundle);
        }
        Ok(())
    }

    fn run_online(&self) -> Result<()> {
        let node = self.local_node()?;
        let entries = self
            .config
            .node
            .install
            .iter()
            .cloned()
            .map(InstallEntry::from);
        let installer = OnlineInstaller::new(Arc::clone(&self.vault), Arc::clone(&self.contexts))
            .with_entries(entries)
            .with_listener(Arc::new(ConsoleListener));
        if installer.entries().is_empty() {
            println!("No node-online installs configured");
            return Ok(());
        }

        let report = NodeLifecycle::new(installer).on_online(&node)?;
        println!(
            "{} {} installed, {} up to date, {} failed",
            style("✓").green(),
            report.installed.iter().filter(|o| o.installed).count(),
            report.installed.iter().filter(|o| !o.installed).count(),
            report.failed.len()
        );
        if !report.failed.is_empty() {
            anyhow::bail!("Failed bundles: {}", report.failed.join(", "));
        }
        Ok(())
    }

    fn local_node(&self) -> Result<Node> {
        let section = &self.config.node;
        let root = match &section.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };
        let mut node = Node::new(section.name.clone().unwrap_or_else(|| "local".to_string()))
            .with_channel(Arc::new(LocalChannel::new()))
            .with_root(root);
        if let Some(text) = &section.context {
            node = node.with_custom_context(CustomContext::parse(text));
        }
        Ok(node)
    }
}

fn parse_id(text: &str) -> Result<PackageId> {
    PackageId::parse(text).ok_or_else(|| anyhow::anyhow!("Invalid package id: {}", text))
}
