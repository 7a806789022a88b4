//! Reading artifact types
//!
//! The normalized [`Document`] produced by the conversion pipeline and
//! persisted as `book.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AssetTable;
use crate::epub::path::split_fragment;

/// Artifact schema version
pub const ARTIFACT_VERSION: &str = "3.0";

/// Normalized reading artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub metadata: DocumentMetadata,
    /// Sections in reading order, never empty after assembly
    pub spine: Vec<Section>,
    pub toc: Vec<NavigationNode>,
    pub images: AssetTable,
    /// Base filename of the source container
    pub source_file: String,
    pub processed_at: DateTime<Utc>,
    pub version: String,
}

impl Document {
    /// Section at a zero-based reading position
    pub fn section(&self, index: usize) -> Option<&Section> {
        self.spine.get(index)
    }

    /// Number of sections
    pub fn section_count(&self) -> usize {
        self.spine.len()
    }

    /// Position of the section whose href matches a navigation node's `file_href`
    pub fn section_index_for(&self, file_href: &str) -> Option<usize> {
        self.spine.iter().position(|s| s.href == file_href)
    }
}

/// Descriptive metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub language: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub date: Option<String>,
    pub identifiers: Vec<String>,
    pub subjects: Vec<String>,
}

impl DocumentMetadata {
    /// Record used when the container's descriptive fields are unusable
    pub fn fallback(title: &str) -> Self {
        Self {
            title: title.to_string(),
            language: "en".to_string(),
            authors: vec!["Unknown".to_string()],
            description: None,
            publisher: None,
            date: None,
            identifiers: Vec::new(),
            subjects: Vec::new(),
        }
    }

    /// Authors joined for display
    pub fn author_line(&self) -> String {
        if self.authors.is_empty() {
            "Unknown".to_string()
        } else {
            self.authors.join(", ")
        }
    }
}

/// One reading-order content file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Manifest id
    pub id: String,
    /// OPF-relative path; join key with [`NavigationNode::file_href`]
    pub href: String,
    /// Positional placeholder ("Section N")
    pub title: String,
    /// Sanitized body fragment
    pub content: String,
    /// Whitespace-collapsed plain text
    pub text: String,
    pub order: usize,
}

/// Table of contents node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationNode {
    pub title: String,
    /// Original href, fragment included
    pub href: String,
    /// Href without fragment
    pub file_href: String,
    /// Fragment only, empty if none
    pub anchor: String,
    #[serde(default)]
    pub children: Vec<NavigationNode>,
}

impl NavigationNode {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        let href = href.into();
        let (file_href, anchor) = split_fragment(&href);
        Self {
            title: title.into(),
            file_href: file_href.to_string(),
            anchor: anchor.to_string(),
            href,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<NavigationNode>) -> Self {
        self.children = children;
        self
    }

    /// Levels in this subtree, counting the node itself
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Self::depth).max().unwrap_or(0)
    }

    /// Nodes in this subtree, counting the node itself
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }
}
