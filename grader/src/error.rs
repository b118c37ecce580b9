use marker::MarkerError;
use std::io;
use std::path::PathBuf;
use util::archive::ArchiveError;

/// Errors that abort a grading invocation.
///
/// Problems confined to a single exercise (missing fixtures, no solution, compile
/// failures) are not errors: they are recorded in that exercise's report.
#[derive(Debug, thiserror::Error)]
pub enum GraderError {
    #[error("Unknown uploader: {0}")]
    UnknownUploader(String),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to write report: {0}")]
    Report(#[source] MarkerError),

    #[error(transparent)]
    Fixtures(#[from] MarkerError),
}

impl GraderError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GraderError::Io {
            path: path.into(),
            source,
        }
    }
}
