//! Asset lookup table
//!
//! Maps the references markup may use for an asset (its OPF-relative path and
//! its bare filename) to the asset's persisted location inside the artifact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::epub::path::{file_name, parent_dir, resolve_href, split_fragment};

/// Reference key → artifact-relative local path (`images/<name>`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetTable {
    entries: BTreeMap<String, String>,
}

/// Outcome of registering an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Reachable by full path and bare filename
    BothKeys,
    /// Bare filename already belongs to another asset; reachable by full path only
    FullPathOnly,
}

impl AssetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an asset under its full path and, when still free, its bare filename
    ///
    /// The first asset registered under a bare filename keeps that key.
    pub fn register(&mut self, href: &str, local_path: &str) -> Registration {
        self.entries
            .insert(href.to_string(), local_path.to_string());

        let bare = file_name(href);
        if bare == href {
            return Registration::BothKeys;
        }
        match self.entries.get(bare).map(String::as_str) {
            Some(existing) if existing != local_path => Registration::FullPathOnly,
            Some(_) => Registration::BothKeys,
            None => {
                self.entries
                    .insert(bare.to_string(), local_path.to_string());
                Registration::BothKeys
            }
        }
    }

    /// Look up a key exactly
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Resolve a markup reference found in the document at `document_href`
    ///
    /// Tries, in order: the decoded reference resolved against the document's
    /// directory, the decoded reference as written, and its bare filename.
    /// Remote and inline references never resolve.
    pub fn resolve(&self, document_href: &str, reference: &str) -> Option<&str> {
        let reference = reference.trim();
        if reference.is_empty() || is_external(reference) {
            return None;
        }

        let (reference, _) = split_fragment(reference);
        let decoded = urlencoding::decode(reference)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| reference.to_string());

        let relative = resolve_href(parent_dir(document_href), &decoded);
        self.get(&relative)
            .or_else(|| self.get(&decoded))
            .or_else(|| self.get(file_name(&decoded)))
    }

    /// Number of keys (an asset usually has two)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, local_path)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Distinct persisted assets
    pub fn asset_count(&self) -> usize {
        let mut paths: Vec<&String> = self.entries.values().collect();
        paths.sort();
        paths.dedup();
        paths.len()
    }
}

/// References that point outside the container
pub fn is_external(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:") || lower.starts_with("data:")
}
