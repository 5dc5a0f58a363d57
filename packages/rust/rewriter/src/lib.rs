//! Streaming rewrite of target documents.
//!
//! A [`Rewriter`] copies a document event by event and injects harvested
//! content at the first schema-correct anchor inside the armed scope. Topics
//! take opaque markup into their prolog; maps get a structured merge into
//! their `topicmeta`. [`rewrite_file`] wraps a pass in the staging-file
//! commit.

pub mod commit;
pub mod driver;
pub mod injection;

pub use commit::{HashingWriter, RewriteOutcome, rewrite_file, staging_path};
pub use driver::{RewriteState, Rewriter, rewrite_str};
pub use injection::{Anchor, Injection, TargetKind};
