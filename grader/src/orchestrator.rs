//! # Grading Orchestrator
//!
//! Drives one uploader's latest snapshot through the pipeline:
//!
//! 1. Extract the upload and re-point `latest` ([`UploadRegistry::extract_latest`]).
//! 2. For every exercise directory found:
//!    - look up its fixtures; with none, the exercise is skipped and no report is written;
//!    - detect and compile the solution, recording the outcome as the `<COMPILE>` case;
//!    - when compilation succeeded, run every test case and write the per-case artifacts;
//!    - write `latest/TEST-<exercise>.json`.
//!
//! A failing exercise never stops the others. Only failures to extract the upload or to
//! write a report abort the invocation.

use code_runner::SolutionDetector;
use futures::stream::{self, StreamExt};
use marker::report::write_report;
use marker::{FixtureRepository, TestCase};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};
use util::paths;

use crate::error::GraderError;
use crate::uploads::UploadRegistry;

/// Compile-case error text when no unique solution was found.
pub const MISSING_SOLUTION: &str = "Missing (or ambiguous) solution";

/// Why an exercise did not get a full run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExerciseIssue {
    MissingFixtures,
    SolutionNotFound,
    /// Carries the text recorded in the compile case.
    CompileFailure(String),
}

impl fmt::Display for ExerciseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExerciseIssue::MissingFixtures => write!(f, "No fixtures for this exercise"),
            ExerciseIssue::SolutionNotFound => write!(f, "{MISSING_SOLUTION}"),
            ExerciseIssue::CompileFailure(errors) => write!(f, "{errors}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExerciseStatus {
    /// No report was written.
    Skipped(ExerciseIssue),
    Reported {
        report: PathBuf,
        issue: Option<ExerciseIssue>,
        /// Test cases whose run completed, whatever its exit status.
        cases_run: usize,
        /// Test cases that could not be run at all (spawn failure, timeout).
        run_failures: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseOutcome {
    pub exercise: String,
    pub status: ExerciseStatus,
}

impl ExerciseOutcome {
    fn skipped(exercise: &str, issue: ExerciseIssue) -> Self {
        Self {
            exercise: exercise.to_string(),
            status: ExerciseStatus::Skipped(issue),
        }
    }

    pub fn report(&self) -> Option<&PathBuf> {
        match &self.status {
            ExerciseStatus::Reported { report, .. } => Some(report),
            ExerciseStatus::Skipped(_) => None,
        }
    }
}

/// What a single [`Grader::grade`] call did, one entry per exercise in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradingSummary {
    pub uid: String,
    pub exercises: Vec<ExerciseOutcome>,
}

impl GradingSummary {
    pub fn reported(&self) -> usize {
        self.exercises.iter().filter(|e| e.report().is_some()).count()
    }

    pub fn skipped(&self) -> usize {
        self.exercises.len() - self.reported()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}

pub struct Grader<'a> {
    uploads: &'a UploadRegistry,
    fixtures: &'a FixtureRepository,
    detector: &'a dyn SolutionDetector,
    parallelism: usize,
}

impl<'a> Grader<'a> {
    pub fn new(
        uploads: &'a UploadRegistry,
        fixtures: &'a FixtureRepository,
        detector: &'a dyn SolutionDetector,
    ) -> Self {
        Self {
            uploads,
            fixtures,
            detector,
            parallelism: 1,
        }
    }

    /// Number of exercises of one upload graded concurrently (at least one).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Extracts and grades one upload of `uid`; see [`UploadRegistry::extract_latest`]
    /// for `timestamp` and `clean`.
    pub async fn grade(
        &self,
        uid: &str,
        timestamp: Option<&str>,
        clean: bool,
    ) -> Result<GradingSummary, GraderError> {
        let exercises = self.uploads.extract_latest(uid, timestamp, clean)?;
        if exercises.is_empty() {
            info!(uid, "Nothing to grade");
            return Ok(GradingSummary {
                uid: uid.to_string(),
                exercises: Vec::new(),
            });
        }

        let results: Vec<Result<ExerciseOutcome, GraderError>> = stream::iter(&exercises)
            .map(|exercise| self.grade_exercise(uid, exercise))
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut outcomes = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        outcomes.sort_by(|a, b| a.exercise.cmp(&b.exercise));

        Ok(GradingSummary {
            uid: uid.to_string(),
            exercises: outcomes,
        })
    }

    async fn grade_exercise(
        &self,
        uid: &str,
        exercise: &str,
    ) -> Result<ExerciseOutcome, GraderError> {
        let root = self.uploads.root();
        let exercise_path = paths::latest_exercise_dir(root, uid, exercise);

        let cases = match self.fixtures.cases_for(exercise) {
            Ok(Some(cases)) => cases,
            Ok(None) => {
                warn!(
                    uid,
                    exercise,
                    "Missing cases for {}, in: {}",
                    exercise_path.display(),
                    self.fixtures.label()
                );
                return Ok(ExerciseOutcome::skipped(exercise, ExerciseIssue::MissingFixtures));
            }
            Err(e) => {
                error!(uid, exercise, "Failed to load fixtures: {}", e);
                return Ok(ExerciseOutcome::skipped(exercise, ExerciseIssue::MissingFixtures));
            }
        };

        let mut compile_case = TestCase::compile_case();
        let mut issue = None;
        let solution = self.detector.detect(&exercise_path);

        match &solution {
            None => {
                compile_case.errors = MISSING_SOLUTION.to_string();
                issue = Some(ExerciseIssue::SolutionNotFound);
            }
            Some(solution) => {
                info!(uid, exercise, "Compiling {}", solution.describe());
                let errors = match solution.compile().await {
                    Ok(outcome) if outcome.succeeded() => None,
                    Ok(outcome) if outcome.stderr.trim().is_empty() => Some(format!(
                        "Compilation failed with exit code {}",
                        outcome.returncode
                    )),
                    Ok(outcome) => Some(outcome.stderr),
                    Err(e) => Some(e.to_string()),
                };
                if let Some(errors) = errors {
                    compile_case.errors = errors.clone();
                    issue = Some(ExerciseIssue::CompileFailure(errors));
                }
            }
        }
        if let Some(issue) = &issue {
            warn!(uid, exercise, "Test cases not run: {}", issue);
        }

        let mut results = vec![compile_case];
        let mut cases_run = 0;
        let mut run_failures = 0;

        if let (None, Some(solution)) = (&issue, &solution) {
            let mut cases = (*cases).clone();
            cases_run = cases.fill_actual(&**solution).await;
            run_failures = cases.len() - cases_run;
            info!(
                uid,
                exercise,
                "Ran {} of {} test cases",
                cases_run,
                cases.len()
            );

            if let Err(e) = cases.write(&exercise_path) {
                warn!(uid, exercise, "Failed to write case artifacts: {}", e);
            }
            results.extend(cases.to_list());
        }

        let report = paths::report_path(root, uid, exercise);
        write_report(&report, &results).map_err(GraderError::Report)?;
        info!(uid, exercise, "Report written to {}", report.display());

        Ok(ExerciseOutcome {
            exercise: exercise.to_string(),
            status: ExerciseStatus::Reported {
                report,
                issue,
                cases_run,
                run_failures,
            },
        })
    }
}
