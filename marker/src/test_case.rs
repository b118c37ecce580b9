//! # Test Cases
//!
//! A [`TestCase`] aggregates everything known about one numbered case of an
//! exercise: the fixture data contributed by each [`Kind`] of file, and, once
//! the solution has been run, its actual output, errors and diff against the
//! expected output.
//!
//! Fixture files follow the `<kind>.<number>.txt` naming convention, e.g.
//! `input.3.txt` and `output.3.txt` both contribute to case `"3"`.

use code_runner::{RunOutcome, RunnerError, Solution};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::utilities::line_diff::line_diff;

/// Name of the synthetic case that records the build outcome.
pub const COMPILE_CASE_NAME: &str = "<COMPILE>";

static CASE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_]+\.([0-9]+)\.txt$").expect("valid case number regex"));

/// Category of fixture file. Each kind fills exactly one field of a [`TestCase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Args,
    Input,
    Output,
}

type Setter = fn(&mut TestCase, String);

/// Kind → field setter, in the fixed kind order.
const SETTERS: [(Kind, Setter); 3] = [
    (Kind::Args, set_args),
    (Kind::Input, set_input),
    (Kind::Output, set_expected_output),
];

fn set_args(case: &mut TestCase, raw: String) {
    case.args = Some(decode_args(&raw));
}

fn set_input(case: &mut TestCase, raw: String) {
    case.input = Some(raw);
}

fn set_expected_output(case: &mut TestCase, raw: String) {
    case.expected_output = Some(raw);
}

impl Kind {
    /// Every kind, in the order fixture members are tested against them.
    pub const ALL: [Kind; 3] = [Kind::Args, Kind::Input, Kind::Output];

    pub fn name(self) -> &'static str {
        match self {
            Kind::Args => "args",
            Kind::Input => "input",
            Kind::Output => "output",
        }
    }

    /// Basename glob of fixture files of this kind.
    pub fn glob(self) -> &'static str {
        match self {
            Kind::Args => "args.*.txt",
            Kind::Input => "input.*.txt",
            Kind::Output => "output.*.txt",
        }
    }
}

/// Extracts the case number from a fixture basename such as `args.7.txt`.
pub fn case_number(basename: &str) -> Option<&str> {
    CASE_NUMBER_RE
        .captures(basename)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Turns the raw text of an `args` fixture into an argument list: one argument
/// per line, without the line terminator. A final newline does not add an empty
/// argument, but blank lines in between do.
pub fn decode_args(raw: &str) -> Vec<String> {
    let body = raw.strip_suffix('\n').unwrap_or(raw);
    let body = body.strip_suffix('\r').unwrap_or(body);
    if body.is_empty() {
        return Vec::new();
    }
    body.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// One test case (or the synthetic compile case) and its outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub actual_output: Option<String>,
    #[serde(default)]
    pub errors: String,
    #[serde(default)]
    pub diffs: Option<String>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn compile_case() -> Self {
        Self::new(COMPILE_CASE_NAME)
    }

    /// Stores fixture text of the given kind into its field.
    pub fn set(&mut self, kind: Kind, raw: String) {
        if let Some((_, setter)) = SETTERS.iter().find(|(k, _)| *k == kind) {
            setter(self, raw);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Records the outcome of a completed run.
    pub fn record_run(&mut self, outcome: RunOutcome) {
        self.errors = if outcome.returncode != 0 && outcome.stderr.is_empty() {
            format!("Exited with status {}", outcome.returncode)
        } else {
            outcome.stderr
        };
        self.diffs = self
            .expected_output
            .as_deref()
            .and_then(|expected| line_diff(expected, &outcome.stdout));
        self.actual_output = Some(outcome.stdout);
    }

    /// Records a run that could not complete (spawn failure, timeout, ...).
    pub fn record_failure(&mut self, error: &RunnerError) {
        self.actual_output = None;
        self.diffs = None;
        self.errors = error.to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CaseKey {
    number: u64,
    name: String,
}

impl CaseKey {
    fn new(name: &str) -> Self {
        Self {
            number: name.parse().unwrap_or(u64::MAX),
            name: name.to_string(),
        }
    }
}

/// The test cases of one exercise, kept in ascending numeric order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCases {
    cases: BTreeMap<CaseKey, TestCase>,
}

impl TestCases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the case called `name`, creating it on first sight.
    pub fn entry(&mut self, name: &str) -> &mut TestCase {
        self.cases
            .entry(CaseKey::new(name))
            .or_insert_with(|| TestCase::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&TestCase> {
        self.cases.get(&CaseKey::new(name))
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.values()
    }

    /// Runs every case against `solution`, filling in actual outputs.
    ///
    /// A case whose run fails keeps the failure in its `errors` and does not
    /// stop the remaining cases. Returns the number of runs that completed.
    pub async fn fill_actual(&mut self, solution: &dyn Solution) -> usize {
        let mut completed = 0;
        for case in self.cases.values_mut() {
            let args = case.args.clone().unwrap_or_default();
            match solution.run(&args, case.input.as_deref()).await {
                Ok(outcome) => {
                    case.record_run(outcome);
                    completed += 1;
                }
                Err(e) => {
                    tracing::warn!(case = %case.name, "Run failed: {}", e);
                    case.record_failure(&e);
                }
            }
        }
        completed
    }

    /// Writes per-case artifacts (`actual.N.txt`, `errors.N.txt`, `diffs.N.txt`) into `dir`.
    pub fn write(&self, dir: &Path) -> io::Result<()> {
        for case in self.cases.values() {
            if let Some(actual) = &case.actual_output {
                fs::write(dir.join(format!("actual.{}.txt", case.name)), actual)?;
            }
            if case.has_errors() {
                fs::write(dir.join(format!("errors.{}.txt", case.name)), &case.errors)?;
            }
            if let Some(diffs) = &case.diffs {
                fs::write(dir.join(format!("diffs.{}.txt", case.name)), diffs)?;
            }
        }
        Ok(())
    }

    /// All cases in canonical order, ready for serialization.
    pub fn to_list(&self) -> Vec<TestCase> {
        self.cases.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use code_runner::{CompileOutcome, Stage};
    use std::time::Duration;

    struct EchoSolution;

    #[async_trait]
    impl Solution for EchoSolution {
        fn describe(&self) -> String {
            "echo".into()
        }

        async fn compile(&self) -> Result<CompileOutcome, RunnerError> {
            Ok(CompileOutcome {
                returncode: 0,
                stderr: String::new(),
            })
        }

        async fn run(
            &self,
            args: &[String],
            input: Option<&str>,
        ) -> Result<RunOutcome, RunnerError> {
            if args.first().map(String::as_str) == Some("hang") {
                return Err(RunnerError::Timeout {
                    stage: Stage::Run,
                    limit: Duration::from_secs(1),
                });
            }
            Ok(RunOutcome {
                returncode: 0,
                stdout: format!("{}{}", args.join(" "), input.unwrap_or("")),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_case_number_extraction() {
        assert_eq!(case_number("args.7.txt"), Some("7"));
        assert_eq!(case_number("output.12.txt"), Some("12"));
        assert_eq!(case_number("output.x.txt"), None);
        assert_eq!(case_number("output.7.txt.bak"), None);
    }

    #[test]
    fn test_decode_args() {
        assert_eq!(decode_args("a\nb c\n"), vec!["a", "b c"]);
        assert_eq!(decode_args("a\r\n\r\nb"), vec!["a", "", "b"]);
        assert!(decode_args("").is_empty());
        assert!(decode_args("\n").is_empty());
        assert_eq!(decode_args("\n\n"), vec!["", ""]);
    }

    #[test]
    fn test_setters_fill_distinct_fields() {
        let mut case = TestCase::new("1");
        case.set(Kind::Args, "x\ny\n".into());
        case.set(Kind::Input, "in".into());
        case.set(Kind::Output, "out".into());
        assert_eq!(case.args, Some(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(case.input.as_deref(), Some("in"));
        assert_eq!(case.expected_output.as_deref(), Some("out"));
        assert_eq!(case.actual_output, None);
    }

    #[test]
    fn test_cases_sorted_numerically() {
        let mut cases = TestCases::new();
        cases.entry("10");
        cases.entry("2");
        cases.entry("1");
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_record_run_computes_diff() {
        let mut case = TestCase::new("1");
        case.set(Kind::Output, "42\n".into());
        case.record_run(RunOutcome {
            returncode: 0,
            stdout: "41\n".into(),
            stderr: String::new(),
        });
        assert_eq!(case.actual_output.as_deref(), Some("41\n"));
        assert_eq!(case.diffs.as_deref(), Some("@@ line 1\n- 42\n+ 41\n"));
        assert!(!case.has_errors());
    }

    #[test]
    fn test_record_run_nonzero_exit_without_stderr() {
        let mut case = TestCase::new("1");
        case.record_run(RunOutcome {
            returncode: 3,
            stdout: String::new(),
            stderr: String::new(),
        });
        assert_eq!(case.errors, "Exited with status 3");
    }

    #[tokio::test]
    async fn test_fill_actual_isolates_failures() {
        let mut cases = TestCases::new();
        cases.entry("1").set(Kind::Input, "hi".into());
        cases.entry("2").set(Kind::Args, "hang\n".into());
        cases.entry("3").set(Kind::Args, "a\nb\n".into());

        let completed = cases.fill_actual(&EchoSolution).await;

        assert_eq!(completed, 2);
        assert_eq!(cases.get("1").unwrap().actual_output.as_deref(), Some("hi"));
        let failed = cases.get("2").unwrap();
        assert!(failed.errors.contains("timed out"));
        assert_eq!(failed.actual_output, None);
        assert_eq!(cases.get("3").unwrap().actual_output.as_deref(), Some("a b"));
    }

    #[tokio::test]
    async fn test_write_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cases = TestCases::new();
        cases.entry("1").set(Kind::Output, "expected\n".into());
        cases.entry("1").set(Kind::Input, "actual\n".into());
        cases.fill_actual(&EchoSolution).await;

        cases.write(tmp.path()).unwrap();

        assert_eq!(
            fs::read_to_string(tmp.path().join("actual.1.txt")).unwrap(),
            "actual\n"
        );
        assert!(tmp.path().join("diffs.1.txt").exists());
        assert!(!tmp.path().join("errors.1.txt").exists());
    }
}
