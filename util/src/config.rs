//! Global grader configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables (and a `.env`
//! file if present). Nothing here executes configuration: every value is a plain
//! string parsed into its field, and unparseable values fall back to defaults.

use std::env;
use std::str::FromStr;
use std::sync::{OnceLock, RwLock};

/// What to do with an exercise whose fixture files matched but produced no
/// numbered test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyFixturePolicy {
    /// Treat it exactly like an exercise without fixtures.
    #[default]
    Skip,
    /// Grade it with an empty case set (the report holds only the compile case).
    Grade,
}

impl FromStr for EmptyFixturePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(EmptyFixturePolicy::Skip),
            "grade" => Ok(EmptyFixturePolicy::Grade),
            other => Err(format!("unknown empty fixture policy '{other}'")),
        }
    }
}

/// Represents the complete grader configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upload_root: String,
    pub fixtures_path: String,
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub compile_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub max_uncompressed_size: u64,
    pub empty_fixtures: EmptyFixturePolicy,
    pub max_parallel_exercises: usize,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            upload_root: var_or("UPLOAD_ROOT", "uploads"),
            fixtures_path: var_or("FIXTURES_PATH", "fixtures.tar"),
            log_level: var_or(
                "LOG_LEVEL",
                "grader=info,marker=info,code_runner=info,util=info",
            ),
            log_dir: var_or("LOG_DIR", "logs"),
            log_file: var_or("LOG_FILE", "grader.log"),
            log_to_stdout: var_or("LOG_TO_STDOUT", "true") == "true",
            compile_timeout_secs: parsed_or("COMPILE_TIMEOUT_SECS", 30),
            run_timeout_secs: parsed_or("RUN_TIMEOUT_SECS", 10),
            max_uncompressed_size: parsed_or("MAX_UNCOMPRESSED_SIZE", 100 * 1024 * 1024),
            empty_fixtures: parsed_or("EMPTY_FIXTURES", EmptyFixturePolicy::Skip),
            max_parallel_exercises: parsed_or("MAX_PARALLEL_EXERCISES", 1usize).max(1),
        }
    }

    /// Returns a clone of the global configuration.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn global() -> AppConfig {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
            .clone()
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            let mut guard = lock
                .write()
                .expect("Failed to acquire AppConfig write lock");
            *guard = AppConfig::from_env();
        }
    }

    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_upload_root(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.upload_root = value.into());
    }

    pub fn set_fixtures_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.fixtures_path = value.into());
    }

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_log_to_stdout(value: bool) {
        AppConfig::set_field(|cfg| cfg.log_to_stdout = value);
    }

    pub fn set_compile_timeout_secs(value: u64) {
        AppConfig::set_field(|cfg| cfg.compile_timeout_secs = value);
    }

    pub fn set_run_timeout_secs(value: u64) {
        AppConfig::set_field(|cfg| cfg.run_timeout_secs = value);
    }

    pub fn set_empty_fixtures(value: EmptyFixturePolicy) {
        AppConfig::set_field(|cfg| cfg.empty_fixtures = value);
    }

    pub fn set_max_parallel_exercises(value: usize) {
        AppConfig::set_field(|cfg| cfg.max_parallel_exercises = value.max(1));
    }
}
