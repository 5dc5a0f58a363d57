//! Schema-ordered insertion of metadata into a `topicmeta` sub-tree.

use std::ops::Range;

use tracing::{debug, error, instrument};

use docweave_xml::{Element, Node, markers};

use crate::metadata::MetadataTable;
use crate::schema::{self, Category};

/// Where a path segment lives under its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// An existing child at this index matches the segment.
    Existing(usize),
    /// No match; a new element belongs at this index.
    Vacant(usize),
}

/// Merge every category of `table` into `root`.
#[instrument(skip_all, fields(root = %root.name, categories = table.len()))]
pub fn merge(root: &mut Element, table: &MetadataTable) {
    for (category, nodes) in table.iter() {
        merge_category(root, category, nodes);
    }
}

/// A fresh `topicmeta` holding `table`.
pub fn merge_into_empty(table: &MetadataTable) -> Element {
    let mut root = Element::with_class("topicmeta", "- map/topicmeta ");
    merge(&mut root, table);
    root
}

fn merge_category(root: &mut Element, category: Category, nodes: &[Node]) {
    // A unique category keeps one element: the last one harvested.
    let nodes = if category.is_unique() {
        &nodes[nodes.len().saturating_sub(1)..]
    } else {
        nodes
    };
    let path = category.schema_path();
    let segments = &path[1..];
    let mut parent = root;

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        match locate(parent, segment) {
            Slot::Existing(index) if last => {
                let replaced = category.is_unique();
                let end = if replaced { index + 1 } else { index };
                place(&mut parent.children, index..end, nodes);
                debug!(%category, index, replaced, "merged into existing element");
                return;
            }
            Slot::Existing(index) => {
                parent = match &mut parent.children[index] {
                    Node::Element(e) => e,
                    _ => return,
                };
            }
            Slot::Vacant(index) if last => {
                place(&mut parent.children, index..index, nodes);
                debug!(%category, index, "inserted new element");
                return;
            }
            Slot::Vacant(index) => {
                let placeholder = Element::with_class(segment, &format!("- map/{segment} "));
                parent.children.insert(index, Node::Element(placeholder));
                parent = match &mut parent.children[index] {
                    Node::Element(e) => e,
                    _ => return,
                };
            }
        }
    }
}

/// Replace `range` of `children` with copies of `nodes`.
fn place(children: &mut Vec<Node>, range: Range<usize>, nodes: &[Node]) {
    children.splice(range, nodes.iter().cloned());
}

/// Scan `parent` for `segment`, stopping at the first child ranked after it.
fn locate(parent: &Element, segment: &str) -> Slot {
    let Some(target_rank) = schema::rank(segment) else {
        return Slot::Vacant(parent.children.len());
    };

    for (index, node) in parent.children.iter().enumerate() {
        let Node::Element(child) = node else {
            continue;
        };
        let class = child.class();
        let matches = child.name == segment
            || class
                .as_deref()
                .is_some_and(|c| markers::class_names(c, segment));
        if matches {
            return Slot::Existing(index);
        }
        match schema::rank_of(&child.name, class.as_deref()) {
            Some(rank) if rank > target_rank => return Slot::Vacant(index),
            Some(_) => {}
            None => {
                error!(
                    element = %child.name,
                    segment,
                    "element has no schema rank; appending at end"
                );
                return Slot::Vacant(parent.children.len());
            }
        }
    }
    Slot::Vacant(parent.children.len())
}
