//! The two scheduling modes built on the runner and classifier.
//!
//! Mode A (`parallel`) fans out over pre-materialized, independent job
//! directories. Mode B (`sequential`) drives the isolated-workspace pipeline
//! one job at a time with durable status tracking.

pub mod parallel;
pub mod sequential;

pub use parallel::{BatchOptions, run_batch};
pub use sequential::{BatchSummary, Executor};
