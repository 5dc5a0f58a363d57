//! Batch orchestration for docweave.
//!
//! This crate ties harvesting, fragment lookup and in-place rewriting into
//! one run (see [`pipeline::run`]) and records the outcome in a
//! [`report::RunReport`].

pub mod pipeline;
pub mod report;

pub use pipeline::{
    Harvest, ProgressReporter, RunConfig, SilentProgress, harvest, inject, inject_fragment,
    injection_for, run,
};
pub use report::{DocumentReport, DocumentStatus, RunReport, SourceFailure};
