//! # Code Runner
//!
//! Locates a student's solution inside an extracted exercise directory, builds
//! it and runs it against test inputs. Every child process is bounded by the
//! limits in [`ExecutionConfig`]; an expired limit is reported as
//! [`RunnerError::Timeout`] and the child is killed.
//!
//! The grading pipeline only talks to the [`Solution`] and
//! [`SolutionDetector`] traits, so other runners (or scripted doubles in tests)
//! can be swapped in for the native one.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::time::Duration;

pub mod detect;
pub mod execution_config;
pub mod native;

pub use detect::{AutoDetector, SolutionDetector, autodetect_solution};
pub use execution_config::ExecutionConfig;
pub use native::NativeSolution;

/// Result of a build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    pub returncode: i32,
    pub stderr: String,
}

impl CompileOutcome {
    pub fn succeeded(&self) -> bool {
        self.returncode == 0
    }
}

/// Result of running a built solution once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Pipeline stage a runner error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => write!(f, "compile"),
            Stage::Run => write!(f, "run"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error during {stage} stage: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("The {stage} stage timed out after {secs} seconds", secs = .limit.as_secs())]
    Timeout { stage: Stage, limit: Duration },
}

/// A detected, buildable and runnable solution.
#[async_trait]
pub trait Solution: Send + Sync {
    /// Short human readable description, used in logs.
    fn describe(&self) -> String;

    /// Builds the solution. A non-zero `returncode` is a compile failure, not an `Err`.
    async fn compile(&self) -> Result<CompileOutcome, RunnerError>;

    /// Runs the built solution once with `args` as argv and `input` on stdin.
    async fn run(&self, args: &[String], input: Option<&str>) -> Result<RunOutcome, RunnerError>;
}
