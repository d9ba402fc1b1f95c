//! Enrollment workflow and pipeline orchestration for coenroll.
//!
//! This crate ties the validator and the registry adapter together into the
//! end-to-end `validate` and `enroll` runs.

pub mod output;
pub mod pipeline;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use output::OutputSink;
pub use pipeline::{
    EnrollSummary, ProgressReporter, RowOutcome, SilentProgress, enroll_content, enroll_file,
    enroll_row, enroll_single, run_validation,
};
pub use workflow::{EnrollOutcome, EnrollStep, Enroller};
