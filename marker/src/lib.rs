//! # Marker Library
//!
//! Everything the grader knows about expected results and how to record actual ones.
//!
//! ## Key Concepts
//! - **FixtureRepository**: the archive of expected test data, queried per exercise.
//! - **TestCase / TestCases**: per-number aggregation of fixture kinds plus the run outcome.
//! - **Reports**: deterministic JSON documents holding the compile case and every test case.

pub mod error;
pub mod fixtures;
pub mod report;
pub mod test_case;
pub mod utilities;

pub use error::MarkerError;
pub use fixtures::FixtureRepository;
pub use test_case::{COMPILE_CASE_NAME, Kind, TestCase, TestCases};
