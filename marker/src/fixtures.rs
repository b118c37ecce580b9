//! # Fixture Repository
//!
//! Holds the tar archive of expected test data for every exercise and turns it,
//! on demand, into the [`TestCases`] of one exercise.
//!
//! Members are laid out as `{exercise}/{kind}.{number}.txt`. The first request
//! for an exercise scans the whole archive, tests every member against every
//! [`Kind`] pattern, and merges all members sharing a number into one case. The
//! result, including "this exercise has no fixtures", is memoized for the life
//! of the repository.
//!
//! ## Concurrency
//!
//! The cache map is locked only long enough to fetch the per-exercise cell.
//! Each cell serializes the scan for its own exercise, so concurrent lookups of
//! different exercises do not wait on each other and concurrent lookups of the
//! same exercise scan the archive once.

use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tar::{Archive, EntryType};
use tracing::{debug, warn};
use util::archive::read_archive_bytes;
use util::config::EmptyFixturePolicy;

use crate::error::MarkerError;
use crate::test_case::{Kind, TestCases, case_number};

type CachedCases = Option<Arc<TestCases>>;

pub struct FixtureRepository {
    label: String,
    data: Vec<u8>,
    patterns: GlobSet,
    empty_policy: EmptyFixturePolicy,
    cache: Mutex<HashMap<String, Arc<OnceCell<CachedCases>>>>,
    scans: AtomicUsize,
}

/// One pattern per kind; match index `i` is `Kind::ALL[i]`.
fn kind_patterns() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for kind in Kind::ALL {
        builder.add(Glob::new(kind.glob()).expect("valid kind glob"));
    }
    builder.build().expect("valid kind glob set")
}

/// Returns the basename of `member` if it sits directly inside `exercise`.
fn basename_in<'a>(member: &'a str, exercise: &str) -> Option<&'a str> {
    let member = member.strip_prefix("./").unwrap_or(member);
    let rest = member.strip_prefix(exercise)?.strip_prefix('/')?;
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest)
    }
}

impl FixtureRepository {
    /// Wraps an in-memory tar archive. `label` identifies it in logs.
    pub fn from_bytes(label: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            data,
            patterns: kind_patterns(),
            empty_policy: EmptyFixturePolicy::default(),
            cache: Mutex::new(HashMap::new()),
            scans: AtomicUsize::new(0),
        }
    }

    /// Loads a `.tar`, `.tar.gz` or `.tgz` fixture archive from disk.
    pub fn open(path: &Path) -> Result<Self, MarkerError> {
        let data = read_archive_bytes(path)?;
        debug!("Loaded {} bytes of fixtures from {}", data.len(), path.display());
        Ok(Self::from_bytes(path.display().to_string(), data))
    }

    pub fn with_empty_policy(mut self, policy: EmptyFixturePolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of full archive scans performed so far.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Test cases for `exercise`, or `None` when the archive has no fixtures for it.
    ///
    /// Errors are not cached; a later call scans again.
    pub fn cases_for(&self, exercise: &str) -> Result<Option<Arc<TestCases>>, MarkerError> {
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.entry(exercise.to_string()).or_default().clone()
        };
        cell.get_or_try_init(|| self.scan(exercise)).cloned()
    }

    fn scan(&self, exercise: &str) -> Result<CachedCases, MarkerError> {
        self.scans.fetch_add(1, Ordering::SeqCst);

        let mut archive = Archive::new(Cursor::new(self.data.as_slice()));
        let mut cases = TestCases::new();
        let mut matched = 0usize;

        for entry in archive.entries().map_err(MarkerError::FixtureArchive)? {
            let mut entry = entry.map_err(MarkerError::FixtureArchive)?;
            if !matches!(
                entry.header().entry_type(),
                EntryType::Regular | EntryType::Continuous
            ) {
                continue;
            }

            let member = entry
                .path()
                .map_err(MarkerError::FixtureArchive)?
                .to_string_lossy()
                .into_owned();
            let Some(basename) = basename_in(&member, exercise) else {
                continue;
            };

            let mut hits = self.patterns.matches(basename);
            if hits.is_empty() {
                continue;
            }
            hits.sort_unstable();
            matched += 1;

            let Some(number) = case_number(basename) else {
                warn!(member = %member, "Fixture name carries no case number, skipping");
                continue;
            };

            let mut raw = Vec::new();
            entry
                .read_to_end(&mut raw)
                .map_err(MarkerError::FixtureArchive)?;
            let text = String::from_utf8(raw).map_err(|_| MarkerError::NotUtf8 {
                member: member.clone(),
            })?;

            let case = cases.entry(number);
            for kind in hits.into_iter().filter_map(|i| Kind::ALL.get(i).copied()) {
                debug!(member = %member, kind = kind.name(), "Fixture matched");
                case.set(kind, text.clone());
            }
        }

        if matched == 0 {
            debug!(exercise, "No fixtures in {}", self.label);
            return Ok(None);
        }

        if cases.is_empty() {
            return match self.empty_policy {
                EmptyFixturePolicy::Skip => {
                    warn!(exercise, "Fixtures matched but define no test case; skipping");
                    Ok(None)
                }
                EmptyFixturePolicy::Grade => Ok(Some(Arc::new(cases))),
            };
        }

        debug!(exercise, cases = cases.len(), "Fixtures assembled");
        Ok(Some(Arc::new(cases)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use util::test_helpers::tar_bytes;

    fn repo(files: &[(&str, &str)]) -> FixtureRepository {
        FixtureRepository::from_bytes("test fixtures", tar_bytes(files))
    }

    #[test]
    fn test_pattern_indices_follow_kind_order() {
        let patterns = kind_patterns();
        assert_eq!(patterns.len(), Kind::ALL.len());
        for (i, kind) in Kind::ALL.into_iter().enumerate() {
            assert_eq!(patterns.matches(format!("{}.1.txt", kind.name())), vec![i]);
        }
    }

    #[test]
    fn test_same_number_members_merge() {
        let r = repo(&[("ex/args.7.txt", "a\nb\n"), ("ex/output.7.txt", "ok\n")]);
        let cases = r.cases_for("ex").unwrap().unwrap();
        assert_eq!(cases.len(), 1);
        let case = cases.get("7").unwrap();
        assert_eq!(case.name, "7");
        assert_eq!(case.args, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(case.expected_output.as_deref(), Some("ok\n"));
        assert_eq!(case.input, None);
    }

    #[test]
    fn test_partial_case_leaves_other_fields_unset() {
        let r = repo(&[("ex/args.3.txt", "x\n")]);
        let cases = r.cases_for("ex").unwrap().unwrap();
        let case = cases.get("3").unwrap();
        assert_eq!(case.args, Some(vec!["x".to_string()]));
        assert_eq!(case.input, None);
        assert_eq!(case.expected_output, None);
    }

    #[test]
    fn test_other_exercises_and_nested_paths_ignored() {
        let r = repo(&[
            ("ex/input.1.txt", "in"),
            ("exercise2/input.2.txt", "other"),
            ("ex/sub/input.3.txt", "nested"),
            ("./ex/output.1.txt", "out"),
            ("ex/README.md", "docs"),
        ]);
        let cases = r.cases_for("ex").unwrap().unwrap();
        assert_eq!(cases.len(), 1);
        let case = cases.get("1").unwrap();
        assert_eq!(case.input.as_deref(), Some("in"));
        assert_eq!(case.expected_output.as_deref(), Some("out"));
    }

    #[test]
    fn test_missing_exercise_is_cached() {
        let r = repo(&[("ex/input.1.txt", "in")]);
        assert!(r.cases_for("nope").unwrap().is_none());
        assert_eq!(r.scan_count(), 1);
        assert!(r.cases_for("nope").unwrap().is_none());
        assert_eq!(r.scan_count(), 1);
    }

    #[test]
    fn test_found_exercise_is_cached() {
        let r = repo(&[("ex/input.1.txt", "in")]);
        let first = r.cases_for("ex").unwrap().unwrap();
        let second = r.cases_for("ex").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(r.scan_count(), 1);
    }

    #[test]
    fn test_cases_in_numeric_order() {
        let r = repo(&[
            ("ex/input.10.txt", "10"),
            ("ex/input.2.txt", "2"),
            ("ex/input.1.txt", "1"),
        ]);
        let cases = r.cases_for("ex").unwrap().unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_unnumbered_match_respects_empty_policy() {
        let files = [("ex/input.x.txt", "in")];
        assert!(repo(&files).cases_for("ex").unwrap().is_none());

        let graded = repo(&files).with_empty_policy(EmptyFixturePolicy::Grade);
        let cases = graded.cases_for("ex").unwrap().unwrap();
        assert!(cases.is_empty());
    }

    #[test]
    fn test_non_utf8_fixture_is_error_and_not_cached() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = [0xffu8, 0xfe];
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        builder
            .append_data(&mut header, "ex/input.1.txt", &data[..])
            .unwrap();
        let r = FixtureRepository::from_bytes("bad", builder.into_inner().unwrap());

        assert!(matches!(r.cases_for("ex"), Err(MarkerError::NotUtf8 { .. })));
        assert!(r.cases_for("ex").is_err());
        assert_eq!(r.scan_count(), 2);
    }

    #[test]
    fn test_concurrent_lookups_scan_once_per_exercise() {
        let r = Arc::new(repo(&[("a/input.1.txt", "a"), ("b/input.1.txt", "b")]));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let r = Arc::clone(&r);
                thread::spawn(move || {
                    let exercise = if i % 2 == 0 { "a" } else { "b" };
                    r.cases_for(exercise).unwrap().unwrap().len()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 1);
        }
        assert_eq!(r.scan_count(), 2);
    }

    #[test]
    fn test_open_reads_plain_tar() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fixtures.tar");
        std::fs::write(&path, tar_bytes(&[("ex/output.1.txt", "1\n")])).unwrap();

        let r = FixtureRepository::open(&path).unwrap();

        assert_eq!(r.label(), path.display().to_string());
        assert!(r.cases_for("ex").unwrap().is_some());
    }
}
