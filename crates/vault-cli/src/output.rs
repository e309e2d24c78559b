//! Terminal rendering for listener lines and catalog listings.

use console::style;

use vault_core::catalog::{Bundle, Package};
use vault_core::install::TaskListener;

/// Writes install progress to stdout and errors to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleListener;

impl TaskListener for ConsoleListener {
    fn info(&self, message: &str) {
        println!("  {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("  {} {message}", style("error:").red().bold());
    }
}

pub fn print_bundle_line(bundle: &Bundle) {
    let kind = bundle.kind.as_deref().unwrap_or("-");
    println!(
        "  {:<24} {:<12} {} package(s)",
        style(bundle.name()).green(),
        kind,
        bundle.packages().len()
    );
}

pub fn print_bundle(bundle: &Bundle) {
    println!("{}", style(bundle.name()).bold().cyan());
    if let Some(kind) = &bundle.kind {
        println!("  Type:        {kind}");
    }
    if let Some(description) = &bundle.description {
        println!("  Description: {description}");
    }
    if bundle.packages().is_empty() {
        println!("  {}", style("(no packages)").dim());
        return;
    }
    for pkg in bundle.packages() {
        print_package(pkg);
    }
}

fn print_package(pkg: &Package) {
    let cached = if pkg.is_cached() {
        style("cached").green()
    } else {
        style("not cached").yellow()
    };
    println!();
    println!("  {} [{}]", style(pkg.id()).bold(), cached);
    println!("    Path:        {}", pkg.path);
    if !pkg.includes.is_empty() {
        println!("    Includes:    {}", pkg.includes.join(", "));
    }
    if !pkg.excludes.is_empty() {
        println!("    Excludes:    {}", pkg.excludes.join(", "));
    }
    if let Some(description) = &pkg.description {
        println!("    Description: {description}");
    }
    if pkg.properties.is_empty() {
        println!("    Selector:    {}", style("(any node)").dim());
    } else {
        for line in pkg.properties.render().lines() {
            println!("    Selector:    {line}");
        }
    }
}
