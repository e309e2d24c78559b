//! Attribute text format shared by selector properties and node custom context.
//!
//! One `key=value` pair per line. A line without `=` yields the key with an
//! empty value. Keys may repeat: selector properties collect every value,
//! custom context keeps the last one. Blank lines and `#` comments are ignored.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Constraint multimap declared by a package: key -> acceptable values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorProperties(BTreeMap<String, BTreeSet<String>>);

impl SelectorProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse attribute text, collecting repeated keys into one value set.
    pub fn parse(text: &str) -> Self {
        let mut props = Self::new();
        for (key, value) in parse_lines(text) {
            props.insert(key, value);
        }
        props
    }

    /// Render one line per (key, value) pair.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, values) in &self.0 {
            for value in values {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }

    /// Add an acceptable value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().insert(value.into());
    }

    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of constrained keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SelectorProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (key, value) in iter {
            props.insert(key, value);
        }
        props
    }
}

/// Parse attribute text into a single-valued map; later lines win.
pub fn parse_context(text: &str) -> BTreeMap<String, String> {
    parse_lines(text).collect()
}

/// Render a single-valued map in attribute text form.
pub fn render_context(map: &BTreeMap<String, String>) -> String {
    map.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
}

fn parse_lines(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    text.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line, ""),
        };
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.to_string()))
    })
}
