use anyhow::{Context, bail};
use clap::Parser;
use code_runner::{AutoDetector, ExecutionConfig};
use grader::{Grader, GraderError, UploadRegistry};
use marker::FixtureRepository;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::rolling;
use util::config::AppConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Grade the latest uploads against the fixture archive")]
struct Args {
    /// Upload root holding {uid}/{timestamp}.tar. Defaults to UPLOAD_ROOT
    #[arg(long)]
    root: Option<PathBuf>,
    /// Fixture archive (.tar, .tar.gz or .tgz). Defaults to FIXTURES_PATH
    #[arg(long)]
    fixtures: Option<PathBuf>,
    /// Grade this upload instead of the most recent one. Needs exactly one UID
    #[arg(long)]
    timestamp: Option<String>,
    /// Reuse an already extracted tree instead of extracting again
    #[arg(long)]
    no_clean: bool,
    /// Exercises graded concurrently per upload. Defaults to MAX_PARALLEL_EXERCISES
    #[arg(long)]
    jobs: Option<usize>,
    /// Uploaders to grade. All indexed uploaders when empty
    uids: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::global();
    let _log_guard = init_logging(&config);

    if args.timestamp.is_some() && args.uids.len() != 1 {
        bail!("--timestamp requires exactly one UID");
    }

    let root = args
        .root
        .unwrap_or_else(|| PathBuf::from(&config.upload_root));
    let fixtures_path = args
        .fixtures
        .unwrap_or_else(|| PathBuf::from(&config.fixtures_path));

    let uploads = UploadRegistry::open(&root)
        .with_context(|| format!("indexing uploads under {}", root.display()))?
        .with_max_uncompressed_size(Some(config.max_uncompressed_size));
    let fixtures = FixtureRepository::open(&fixtures_path)
        .map_err(GraderError::Fixtures)
        .with_context(|| format!("loading fixtures from {}", fixtures_path.display()))?
        .with_empty_policy(config.empty_fixtures);
    let detector = AutoDetector::new(ExecutionConfig::from_app_config(&config));

    let grader = Grader::new(&uploads, &fixtures, &detector)
        .with_parallelism(args.jobs.unwrap_or(config.max_parallel_exercises));

    let uids = if args.uids.is_empty() {
        uploads.uids()
    } else {
        args.uids
    };

    let mut failed = 0;
    for uid in &uids {
        match grader.grade(uid, args.timestamp.as_deref(), !args.no_clean).await {
            Ok(summary) => info!(
                uid = %uid,
                reported = summary.reported(),
                skipped = summary.skipped(),
                "Graded"
            ),
            Err(e) => {
                error!(uid = %uid, "Grading failed: {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} uploaders could not be graded", uids.len());
    }
    Ok(())
}

fn init_logging(config: &AppConfig) -> tracing_appender::non_blocking::WorkerGuard {
    use std::fs;
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    fs::create_dir_all(&config.log_dir).ok();

    let file_appender = rolling::daily(&config.log_dir, &config.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true);

    let env_filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("grader=info,marker=info,code_runner=info,util=info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if config.log_to_stdout {
        registry.with(stdout_layer).init();
    } else {
        registry.init();
    }

    guard
}
