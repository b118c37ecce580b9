//! Marker Error Types
//!
//! This module defines the [`MarkerError`] enum, which covers everything that can go wrong while
//! loading the fixture archive, assembling test cases from it, and persisting or reading grading
//! reports.
//!
//! # Example
//!
//! ```rust
//! use marker::error::MarkerError;
//!
//! fn require_utf8(member: &str, raw: Vec<u8>) -> Result<String, MarkerError> {
//!     String::from_utf8(raw).map_err(|_| MarkerError::NotUtf8 {
//!         member: member.to_string(),
//!     })
//! }
//! # assert!(require_utf8("ex/input.1.txt", vec![0xff]).is_err());
//! ```

use std::io;
use std::path::PathBuf;
use util::archive::ArchiveError;

/// Represents all error types that can occur in the marker system.
#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    /// The fixture archive file could not be loaded.
    #[error("Failed to load fixture archive: {0}")]
    Archive(#[from] ArchiveError),

    /// The in-memory fixture archive could not be read as tar.
    #[error("Malformed fixture archive: {0}")]
    FixtureArchive(#[source] io::Error),

    /// A fixture member matched a kind but is not valid UTF-8 text.
    #[error("Fixture member {member} is not valid UTF-8")]
    NotUtf8 { member: String },

    /// A report could not be written or read.
    #[error("Report I/O error on {path}: {source}")]
    ReportIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A report could not be encoded or decoded.
    #[error("Invalid report JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
