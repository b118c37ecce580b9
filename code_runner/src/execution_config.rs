use serde::Deserialize;
use std::time::Duration;
use util::config::AppConfig;

/// Time limits applied to the compile and run stages of a solution.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub compile_timeout_secs: u64, // Max build time
    pub run_timeout_secs: u64,     // Max time per test case
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            compile_timeout_secs: 30,
            run_timeout_secs: 10,
        }
    }
}

impl ExecutionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            compile_timeout_secs: config.compile_timeout_secs,
            run_timeout_secs: config.run_timeout_secs,
        }
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}
