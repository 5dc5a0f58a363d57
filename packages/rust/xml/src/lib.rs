//! XML plumbing shared by the harvest and rewrite passes.
//!
//! - [`fidelity`] — the entity/CDATA/PI policy and the event [`Serializer`]
//! - [`sink`] — [`StreamSink`] and [`BufferSink`] output targets
//! - [`tree`] — a small raw-preserving element tree for merge spans
//! - [`markers`] — class-marker based element identification
//! - [`tap`] — raw prolog capture for DOCTYPE spelling

pub mod fidelity;
pub mod markers;
pub mod sink;
pub mod tap;
pub mod tree;

pub use fidelity::{EntityTable, Mode, Serializer, escape_text, normalize_text};
pub use markers::{TypeMarker, attribute, element_name, end_name};
pub use sink::{BufferSink, Sink, StreamSink};
pub use tap::{PrologTap, doctype_prefix};
pub use tree::{Element, Node, parse_fragment, to_markup};
