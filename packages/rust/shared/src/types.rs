//! Core domain types shared by the harvest and rewrite passes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel used on the wire for "no fragment id was given".
pub const UNSPECIFIED_FRAGMENT: &str = "#";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one harvest+inject run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// FragmentId / FragmentKey
// ---------------------------------------------------------------------------

/// The part of a reference after `#`, or the reserved "unspecified" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FragmentId {
    /// The reference named no fragment (or an empty one).
    Unspecified,
    /// A slash-delimited id path, e.g. `topic1` or `topic1/section2`.
    Named(String),
}

impl FragmentId {
    /// Build from the text after `#`; empty text maps to the sentinel.
    pub fn from_fragment(fragment: &str) -> Self {
        if fragment.is_empty() {
            Self::Unspecified
        } else {
            Self::Named(fragment.to_string())
        }
    }

    /// The identity path segments this fragment selects.
    pub fn id_path(&self) -> Option<Vec<String>> {
        match self {
            Self::Unspecified => None,
            Self::Named(id) => Some(id.split('/').map(str::to_string).collect()),
        }
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => f.write_str(UNSPECIFIED_FRAGMENT),
            Self::Named(id) => f.write_str(id),
        }
    }
}

impl Serialize for FragmentId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Fragment table key: `(documentPath, fragmentId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FragmentKey {
    /// Forward-slash document path, resolved against the referencing document.
    pub document: String,
    /// Fragment within that document.
    pub fragment: FragmentId,
}

impl FragmentKey {
    /// Split a resolved reference (`dir/a.dita#t1`) at its first `#`.
    pub fn from_resolved(resolved: &str) -> Self {
        match resolved.split_once('#') {
            Some((document, fragment)) => Self {
                document: document.to_string(),
                fragment: FragmentId::from_fragment(fragment),
            },
            None => Self {
                document: resolved.to_string(),
                fragment: FragmentId::Unspecified,
            },
        }
    }

    /// The rewrite target this key addresses.
    pub fn target(&self) -> DocumentTarget {
        DocumentTarget {
            path: PathBuf::from(&self.document),
            scope: self.fragment.id_path(),
        }
    }
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            FragmentId::Unspecified => f.write_str(&self.document),
            FragmentId::Named(id) => write!(f, "{}#{id}", self.document),
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentTarget
// ---------------------------------------------------------------------------

/// A document to rewrite, optionally narrowed to one identity path inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTarget {
    /// File on disk.
    pub path: PathBuf,
    /// Trailing `id` path that arms injection; `None` arms at document start.
    pub scope: Option<Vec<String>>,
}

impl DocumentTarget {
    /// Parse `path`, `path#id` or `path#id/child`. A trailing bare `#` is ignored.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_suffix('#').unwrap_or(raw);
        match raw.rsplit_once('#') {
            Some((path, fragment)) => Self {
                path: PathBuf::from(path),
                scope: FragmentId::from_fragment(fragment).id_path(),
            },
            None => Self {
                path: PathBuf::from(raw),
                scope: None,
            },
        }
    }
}

impl fmt::Display for DocumentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(scope) = &self.scope {
            write!(f, "#{}", scope.join("/"))?;
        }
        Ok(())
    }
}
