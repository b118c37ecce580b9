//! Solution auto-detection.
//!
//! A directory holds a solution when its top level contains source files of
//! exactly one supported language and, for languages that need a single entry
//! point, that entry point is unambiguous.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;
use util::languages::Language;

use crate::{ExecutionConfig, NativeSolution, Solution};

/// Locates the solution inside an extracted exercise directory.
pub trait SolutionDetector: Send + Sync {
    /// `None` when no solution, or more than one candidate, is present.
    fn detect(&self, exercise_dir: &Path) -> Option<Box<dyn Solution>>;
}

/// Detector backed by [`autodetect_solution`].
#[derive(Debug, Clone, Default)]
pub struct AutoDetector {
    config: ExecutionConfig,
}

impl AutoDetector {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }
}

impl SolutionDetector for AutoDetector {
    fn detect(&self, exercise_dir: &Path) -> Option<Box<dyn Solution>> {
        autodetect_solution(exercise_dir, &self.config).map(|s| Box::new(s) as Box<dyn Solution>)
    }
}

pub fn autodetect_solution(dir: &Path, config: &ExecutionConfig) -> Option<NativeSolution> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            return None;
        }
    };

    let mut by_language: HashMap<Language, Vec<String>> = HashMap::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let (Some(language), Some(name)) = (
            Language::of_path(&path),
            path.file_name().and_then(|n| n.to_str()),
        ) {
            by_language.entry(language).or_default().push(name.to_string());
        }
    }

    if by_language.len() != 1 {
        debug!(
            "Found {} candidate languages in {}",
            by_language.len(),
            dir.display()
        );
        return None;
    }

    let (language, mut sources) = by_language.into_iter().next()?;
    sources.sort();

    let entry = match language.main_filename() {
        None => None,
        Some(_) if sources.len() == 1 => Some(sources[0].clone()),
        Some(main) => match sources.iter().find(|s| s.as_str() == main) {
            Some(found) => Some(found.clone()),
            None => {
                debug!(
                    "Ambiguous {} entry point in {}: {:?}",
                    language.name(),
                    dir.display(),
                    sources
                );
                return None;
            }
        },
    };

    Some(NativeSolution::new(
        dir.to_path_buf(),
        language,
        sources,
        entry,
        config.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_with(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for f in files {
            fs::write(tmp.path().join(f), "").unwrap();
        }
        tmp
    }

    #[test]
    fn test_single_c_file() {
        let tmp = dir_with(&["hello.c", "README.md"]);
        let s = autodetect_solution(tmp.path(), &ExecutionConfig::default()).unwrap();
        assert_eq!(s.language(), Language::C);
        assert_eq!(s.entry(), None);
    }

    #[test]
    fn test_empty_dir_has_no_solution() {
        let tmp = dir_with(&["notes.txt"]);
        assert!(autodetect_solution(tmp.path(), &ExecutionConfig::default()).is_none());
    }

    #[test]
    fn test_mixed_languages_are_ambiguous() {
        let tmp = dir_with(&["a.c", "b.py"]);
        assert!(autodetect_solution(tmp.path(), &ExecutionConfig::default()).is_none());
    }

    #[test]
    fn test_python_entry_resolution() {
        let tmp = dir_with(&["helpers.py", "main.py"]);
        let s = autodetect_solution(tmp.path(), &ExecutionConfig::default()).unwrap();
        assert_eq!(s.entry(), Some("main.py"));

        let tmp = dir_with(&["a.py", "b.py"]);
        assert!(autodetect_solution(tmp.path(), &ExecutionConfig::default()).is_none());
    }

    #[test]
    fn test_single_java_file_is_entry() {
        let tmp = dir_with(&["Hello.java"]);
        let s = autodetect_solution(tmp.path(), &ExecutionConfig::default()).unwrap();
        assert_eq!(s.entry(), Some("Hello.java"));
    }

    #[test]
    fn test_missing_dir_has_no_solution() {
        let tmp = TempDir::new().unwrap();
        let detector = AutoDetector::default();
        assert!(detector.detect(&tmp.path().join("absent")).is_none());
    }
}
