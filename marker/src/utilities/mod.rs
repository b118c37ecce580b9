//! # Utilities
//!
//! Helpers shared across the `marker` crate.
//!
//! - [`line_diff`]: position-by-position comparison of expected and actual output.

pub mod line_diff;
