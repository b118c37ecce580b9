//! # Grader
//!
//! Batch grading of uploaded exercise snapshots.
//!
//! - [`uploads::UploadRegistry`] indexes `{root}/{uid}/{timestamp}.tar` archives, extracts
//!   them and maintains each uploader's `latest` alias.
//! - [`orchestrator::Grader`] grades every exercise of an upload against the fixture
//!   repository and writes one `TEST-<exercise>.json` report per exercise.

pub mod error;
pub mod orchestrator;
pub mod uploads;

pub use error::GraderError;
pub use orchestrator::{ExerciseIssue, ExerciseOutcome, ExerciseStatus, Grader, GradingSummary};
pub use uploads::UploadRegistry;
