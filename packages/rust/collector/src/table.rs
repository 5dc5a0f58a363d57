//! The read-only fragment table produced by a harvest.

use std::collections::BTreeMap;

use serde::Serialize;

use docweave_shared::{FragmentId, FragmentKey};

/// `(documentPath, fragmentId) -> markup`, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentTable {
    entries: BTreeMap<FragmentKey, String>,
}

impl FragmentTable {
    /// Append markup under `key`; existing content is kept and extended.
    pub(crate) fn append(&mut self, key: FragmentKey, markup: &str) {
        self.entries.entry(key).or_default().push_str(markup);
    }

    pub fn get(&self, key: &FragmentKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Lookup by document path and fragment.
    pub fn lookup(&self, document: &str, fragment: &FragmentId) -> Option<&str> {
        self.get(&FragmentKey {
            document: document.to_string(),
            fragment: fragment.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FragmentKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &FragmentKey> {
        self.entries.keys()
    }

    /// Distinct document paths, in order.
    pub fn documents(&self) -> Vec<&str> {
        let mut docs: Vec<&str> = self.entries.keys().map(|k| k.document.as_str()).collect();
        docs.dedup();
        docs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Serialized as a flat object keyed by `document[#fragment]`.
impl Serialize for FragmentTable {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(self.entries.iter().map(|(k, v)| (k.to_string(), v)))
    }
}
