//! Harvested metadata grouped by category.

use std::collections::BTreeMap;

use tracing::debug;

use docweave_shared::Result;
use docweave_xml::markers::MAP_TOPICMETA;
use docweave_xml::{Element, Node, parse_fragment, to_markup};

use crate::schema::Category;

/// `{Category -> sibling elements}` for one target document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataTable {
    entries: BTreeMap<Category, Vec<Node>>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group the children of harvested `topicmeta` spans by category.
    ///
    /// Wrapper `topicmeta` elements are unwrapped; elements that belong to no
    /// category are skipped.
    pub fn from_markup(markup: &str) -> Result<Self> {
        let mut table = Self::new();
        table.absorb(&parse_fragment(markup)?);
        Ok(table)
    }

    fn absorb(&mut self, nodes: &[Node]) {
        for element in nodes.iter().filter_map(Node::as_element) {
            let class = element.class();
            if MAP_TOPICMETA.matches(&element.name, class.as_deref()) {
                self.absorb(&element.children);
                continue;
            }
            match Category::classify(&element.name, class.as_deref()) {
                Some(Category::Title) if element.name == "title" => {
                    let mut title = element.clone();
                    title.rename(Category::Title.element());
                    self.push(Category::Title, title);
                }
                Some(category) => self.push(category, element.clone()),
                None => debug!(element = %element.name, "no metadata category, skipped"),
            }
        }
    }

    /// Append one element to a category.
    pub fn push(&mut self, category: Category, element: Element) {
        self.entries
            .entry(category)
            .or_default()
            .push(Node::Element(element));
    }

    /// Replace a category wholesale.
    pub fn insert(&mut self, category: Category, nodes: Vec<Node>) {
        self.entries.insert(category, nodes);
    }

    pub fn get(&self, category: Category) -> Option<&[Node]> {
        self.entries.get(&category).map(Vec::as_slice)
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[Node])> {
        self.entries.iter().map(|(c, n)| (*c, n.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Markup for a topic `metadata` container: the categories that fit there,
    /// in schema order.
    pub fn metadata_markup(&self) -> String {
        let mut out = String::new();
        for (category, nodes) in self.iter() {
            if category.fits_topic_metadata() {
                out.push_str(&to_markup(nodes));
            } else {
                debug!(%category, "category not allowed in topic metadata, skipped");
            }
        }
        out
    }
}
