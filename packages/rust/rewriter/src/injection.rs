//! What gets injected, into what kind of document, and where it landed.

use std::path::Path;

use serde::Serialize;

use docweave_merge::MetadataTable;
use docweave_shared::{InjectOptions, Result};

/// Kind of target document; decides the anchor policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Opaque markup into the topic prolog.
    Topic,
    /// Structured merge into the map's `topicmeta`.
    Map,
}

impl TargetKind {
    /// Map if the extension is one of the configured map extensions.
    pub fn detect(path: &Path, options: &InjectOptions) -> Self {
        if options.is_map(path) {
            TargetKind::Map
        } else {
            TargetKind::Topic
        }
    }
}

/// Content to inject into one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    /// Serialized markup, written as-is.
    Markup(String),
    /// Categorized metadata, merged in schema order.
    Metadata(MetadataTable),
}

impl Injection {
    pub fn is_empty(&self) -> bool {
        match self {
            Injection::Markup(m) => m.trim().is_empty(),
            Injection::Metadata(t) => t.is_empty(),
        }
    }

    /// Markup form for topic targets.
    pub fn to_markup(&self) -> String {
        match self {
            Injection::Markup(m) => m.clone(),
            Injection::Metadata(t) => t.metadata_markup(),
        }
    }

    /// Table form for map targets.
    pub fn to_table(&self) -> Result<MetadataTable> {
        match self {
            Injection::Markup(m) => MetadataTable::from_markup(m),
            Injection::Metadata(t) => Ok(t.clone()),
        }
    }
}

/// Where the injection was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    /// Right after the start tag of an existing `metadata`.
    ExistingMetadata,
    /// New `metadata` before a prolog child that follows it in schema order.
    BeforePrologChild,
    /// New `metadata` just before `</prolog>`.
    PrologEnd,
    /// New `prolog` before body, related links, a nested topic, or the end
    /// of the scope element.
    NewProlog,
    /// Merged into the scope's own `topicmeta`.
    ExistingTopicmeta,
    /// New `topicmeta` before the first child reference or the end of the
    /// scope element.
    NewTopicmeta,
}
