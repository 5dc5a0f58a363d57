//! Schema-ordered metadata merge.
//!
//! Harvested metadata is grouped into a [`MetadataTable`] and merged into an
//! existing (or synthetic) `topicmeta` element following a fixed child order.
//! Categories in the uniqueness set replace what is there; the rest are added
//! as siblings.

pub mod merger;
pub mod metadata;
pub mod schema;

pub use merger::{merge, merge_into_empty};
pub use metadata::MetadataTable;
pub use schema::Category;
