//! Builds and runs solutions with the host toolchains.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;
use util::languages::Language;

use crate::{CompileOutcome, ExecutionConfig, RunOutcome, RunnerError, Solution, Stage};

/// Build products live here, inside the exercise directory.
pub const BUILD_DIR: &str = ".grader-build";

const BINARY_NAME: &str = "solution";

/// A solution built and run with the toolchains installed on this machine.
#[derive(Debug, Clone)]
pub struct NativeSolution {
    root: PathBuf,
    language: Language,
    sources: Vec<String>,
    entry: Option<String>,
    config: ExecutionConfig,
}

struct ProcessOutput {
    returncode: i32,
    stdout: String,
    stderr: String,
}

impl NativeSolution {
    /// `sources` are file names relative to `root`. `entry` is the file that
    /// holds the program's entry point, for languages that need one.
    pub fn new(
        root: PathBuf,
        language: Language,
        sources: Vec<String>,
        entry: Option<String>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            root,
            language,
            sources,
            entry,
            config,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    fn binary_path(&self) -> String {
        self.root
            .join(BUILD_DIR)
            .join(BINARY_NAME)
            .display()
            .to_string()
    }

    fn entry_or_first(&self) -> String {
        self.entry
            .clone()
            .or_else(|| self.sources.first().cloned())
            .unwrap_or_default()
    }

    /// The build command line, run with the exercise directory as working directory.
    pub fn compile_command(&self) -> Vec<String> {
        let out = format!("{BUILD_DIR}/{BINARY_NAME}");
        let mut cmd: Vec<String> = match self.language {
            Language::C => vec!["cc".into(), "-O2".into(), "-o".into(), out],
            Language::Cpp => vec!["c++".into(), "-O2".into(), "-o".into(), out],
            Language::Java => vec!["javac".into(), "-d".into(), BUILD_DIR.into()],
            Language::Python => {
                return vec![
                    "python3".into(),
                    "-m".into(),
                    "py_compile".into(),
                    self.entry_or_first(),
                ];
            }
            Language::Rust => {
                return vec![
                    "rustc".into(),
                    "-O".into(),
                    "-o".into(),
                    out,
                    self.entry_or_first(),
                ];
            }
        };
        cmd.extend(self.sources.iter().cloned());
        if self.language == Language::C {
            cmd.push("-lm".into());
        }
        cmd
    }

    /// The run command line, without the per-case arguments.
    pub fn run_command(&self) -> Vec<String> {
        match self.language {
            Language::C | Language::Cpp | Language::Rust => vec![self.binary_path()],
            Language::Java => {
                let class = Path::new(&self.entry_or_first())
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Main".into());
                vec!["java".into(), "-cp".into(), BUILD_DIR.into(), class]
            }
            Language::Python => vec!["python3".into(), self.entry_or_first()],
        }
    }

    async fn execute(
        &self,
        argv: &[String],
        input: Option<&str>,
        stage: Stage,
        limit: Duration,
    ) -> Result<ProcessOutput, RunnerError> {
        let (program, args) = argv.split_first().ok_or_else(|| RunnerError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        debug!(stage = %stage, "Executing {:?} in {}", argv, self.root.display());

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(data)) = (stdin, input) {
                // The child may legitimately exit without reading everything.
                let _ = pipe.write_all(data.as_bytes()).await;
            }
        };

        let waited = timeout(limit, async {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        })
        .await
        .map_err(|_| RunnerError::Timeout { stage, limit })?;

        let output = waited.map_err(|source| RunnerError::Io { stage, source })?;

        Ok(ProcessOutput {
            returncode: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl Solution for NativeSolution {
    fn describe(&self) -> String {
        format!(
            "{} solution in {} ({})",
            self.language.name(),
            self.root.display(),
            self.sources.join(", ")
        )
    }

    async fn compile(&self) -> Result<CompileOutcome, RunnerError> {
        tokio::fs::create_dir_all(self.root.join(BUILD_DIR))
            .await
            .map_err(|source| RunnerError::Io {
                stage: Stage::Compile,
                source,
            })?;

        let output = self
            .execute(
                &self.compile_command(),
                None,
                Stage::Compile,
                self.config.compile_timeout(),
            )
            .await?;

        Ok(CompileOutcome {
            returncode: output.returncode,
            stderr: output.stderr,
        })
    }

    async fn run(&self, args: &[String], input: Option<&str>) -> Result<RunOutcome, RunnerError> {
        let mut argv = self.run_command();
        argv.extend(args.iter().cloned());

        let output = self
            .execute(&argv, input, Stage::Run, self.config.run_timeout())
            .await?;

        Ok(RunOutcome {
            returncode: output.returncode,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
