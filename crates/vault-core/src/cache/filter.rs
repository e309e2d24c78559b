//! Include/exclude selection of files inside a package source directory.
//!
//! Patterns follow the usual Ant conventions: `*` stays inside one path
//! segment, `**` spans directories, and a trailing `/` means everything below
//! that directory. A pattern entry may hold several patterns separated by
//! commas or whitespace. An empty include list includes everything.

use glob::{MatchOptions, Pattern};

use crate::error::{Result, VaultError};

/// SCM metadata and editor leftovers that are never archived.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/*~",
    "**/#*#",
    "**/.#*",
    "**/%*%",
    "**/._*",
    "**/CVS/**",
    "**/.cvsignore",
    "**/SCCS/**",
    "**/vssver.scc",
    "**/.svn/**",
    "**/.DS_Store",
    "**/.git/**",
    "**/.gitattributes",
    "**/.gitignore",
    "**/.gitmodules",
    "**/.hg/**",
    "**/.hgignore",
    "**/.hgsub",
    "**/.hgsubstate",
    "**/.hgtags",
    "**/.bzr/**",
    "**/.bzrignore",
];

pub(crate) const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct FileFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl FileFilter {
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self> {
        let excludes = split_patterns(excludes)
            .chain(DEFAULT_EXCLUDES.iter().map(|p| p.to_string()))
            .map(|p| compile(&p))
            .collect::<Result<Vec<_>>>()?;
        let includes = split_patterns(includes)
            .map(|p| compile(&p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { includes, excludes })
    }

    /// Whether a file, given by its `/`-separated path relative to the
    /// source directory, belongs in the archive.
    pub fn matches(&self, relative: &str) -> bool {
        let included = self.includes.is_empty()
            || self
                .includes
                .iter()
                .any(|p| p.matches_with(relative, MATCH_OPTIONS));
        included
            && !self
                .excludes
                .iter()
                .any(|p| p.matches_with(relative, MATCH_OPTIONS))
    }
}

fn split_patterns(entries: &[String]) -> impl Iterator<Item = String> + '_ {
    entries
        .iter()
        .flat_map(|e| e.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|p| !p.is_empty())
        .map(normalize)
}

fn normalize(pattern: &str) -> String {
    let mut pattern = pattern.replace('\\', "/");
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest.to_string();
    }
    let mut pattern = pattern.trim_start_matches('/').to_string();
    if pattern.ends_with('/') {
        pattern.push_str("**");
    }
    pattern
}

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|source| VaultError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
