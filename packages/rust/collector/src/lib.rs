//! Fragment harvesting.
//!
//! A [`FragmentCollector`] walks source maps once each, capturing the markup
//! under every gated reference, and is consumed into a read-only
//! [`FragmentTable`] before any rewrite starts.

pub mod collector;
pub mod reference;
pub mod table;

pub use collector::{FragmentCollector, has_content};
pub use table::FragmentTable;
