//! Static schema data: metadata categories, child order and uniqueness.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::Serialize;

use docweave_xml::markers;

/// Child order of `topicmeta`, earliest first.
const SCHEMA_ORDER: [&str; 22] = [
    "topicmeta",
    "navtitle",
    "linktext",
    "searchtitle",
    "shortdesc",
    "author",
    "source",
    "publisher",
    "copyright",
    "critdates",
    "permissions",
    "metadata",
    "audience",
    "category",
    "keywords",
    "prodinfo",
    "othermeta",
    "resourceid",
    "data",
    "data-about",
    "foreign",
    "unknown",
];

static RANKS: LazyLock<HashMap<&'static str, usize>> = LazyLock::new(|| {
    SCHEMA_ORDER
        .iter()
        .enumerate()
        .map(|(rank, name)| (*name, rank))
        .collect()
});

/// Rank of an element name in the schema order.
pub fn rank(name: &str) -> Option<usize> {
    RANKS.get(name).copied()
}

/// Rank by element name, falling back to the generalized name in `class`.
pub fn rank_of(name: &str, class: Option<&str>) -> Option<usize> {
    rank(name).or_else(|| class.and_then(markers::generalized_name).and_then(rank))
}

/// A metadata category carried from maps into targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Map-side `searchtitle`; harvested as `title` or `searchtitle`.
    Title,
    Author,
    Source,
    Publisher,
    Copyright,
    Critdates,
    Permissions,
    Audience,
    Category,
    Keywords,
    Prodinfo,
    Othermeta,
    Resourceid,
    Data,
    DataAbout,
    Foreign,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 17] = [
        Category::Title,
        Category::Author,
        Category::Source,
        Category::Publisher,
        Category::Copyright,
        Category::Critdates,
        Category::Permissions,
        Category::Audience,
        Category::Category,
        Category::Keywords,
        Category::Prodinfo,
        Category::Othermeta,
        Category::Resourceid,
        Category::Data,
        Category::DataAbout,
        Category::Foreign,
        Category::Unknown,
    ];

    /// Element this category becomes inside `topicmeta`.
    pub fn element(self) -> &'static str {
        match self {
            Category::Title => "searchtitle",
            Category::Author => "author",
            Category::Source => "source",
            Category::Publisher => "publisher",
            Category::Copyright => "copyright",
            Category::Critdates => "critdates",
            Category::Permissions => "permissions",
            Category::Audience => "audience",
            Category::Category => "category",
            Category::Keywords => "keywords",
            Category::Prodinfo => "prodinfo",
            Category::Othermeta => "othermeta",
            Category::Resourceid => "resourceid",
            Category::Data => "data",
            Category::DataAbout => "data-about",
            Category::Foreign => "foreign",
            Category::Unknown => "unknown",
        }
    }

    /// Category for a harvested element name.
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Category::Title),
            other => Self::ALL.into_iter().find(|c| c.element() == other),
        }
    }

    /// Category by element name, falling back to the generalized class name.
    pub fn classify(name: &str, class: Option<&str>) -> Option<Self> {
        Self::from_element(name).or_else(|| {
            class
                .and_then(markers::generalized_name)
                .and_then(Self::from_element)
        })
    }

    /// Path from the `topicmeta` root down to this category's element.
    pub fn schema_path(self) -> [&'static str; 2] {
        ["topicmeta", self.element()]
    }

    /// Unique categories replace an existing element instead of adding siblings.
    pub fn is_unique(self) -> bool {
        matches!(
            self,
            Category::Critdates
                | Category::Permissions
                | Category::Publisher
                | Category::Source
                | Category::Title
        )
    }

    /// Categories allowed inside a topic `metadata` container.
    pub fn fits_topic_metadata(self) -> bool {
        matches!(
            self,
            Category::Audience
                | Category::Category
                | Category::Keywords
                | Category::Prodinfo
                | Category::Othermeta
                | Category::Data
                | Category::DataAbout
                | Category::Foreign
                | Category::Unknown
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element())
    }
}
