//! Run command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use vigil_engine::backend::fixture::FixtureFile;
use vigil_engine::checkpoint::CheckpointStore;
use vigil_engine::config::EngineConfig;
use vigil_engine::metrics::encode_metrics;
use vigil_engine::processor::AlertProcessor;
use vigil_engine::storage::file::FileKeyValueStore;
use vigil_engine::task::{RunKey, StaticRetryTimetable, TaskTracker};
use vigil_engine::RunError;
use vigil_shared::types::rule::{PeriodKind, SiteId};

/// Exit status telling the scheduler to retry later (EX_TEMPFAIL).
const EXIT_RETRY: i32 = 75;

/// Exit status of a run that failed for good.
const EXIT_FAILED: i32 = 1;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Period to evaluate (day, week, month)
    #[arg(short, long)]
    pub period: PeriodKind,

    /// Site id
    #[arg(short, long)]
    pub site: SiteId,

    /// How many times this run has been retried already
    #[arg(short, long, default_value = "0")]
    pub retry_count: u32,

    /// JSON fixture with rules, report catalog and report tables
    #[arg(short, long)]
    pub fixture: PathBuf,

    /// Checkpoint state file (overrides the configured one)
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub print_metrics: bool,
}

pub async fn run(args: RunArgs, config: EngineConfig) -> Result<()> {
    let fixture = FixtureFile::load(&args.fixture)?;
    let (store, backend) = fixture.into_parts();
    let backend = Arc::new(backend);

    let state_path = args.state.unwrap_or_else(|| config.state_path.clone());
    let medium = Arc::new(FileKeyValueStore::new(state_path));
    let clock = Arc::new(config.clock()?);

    let processor = AlertProcessor::new(
        Arc::new(store),
        backend.clone(),
        backend,
        clock,
        CheckpointStore::new(medium),
    );

    let task = RunKey::new(args.period, args.site).task_name();
    let timetable = StaticRetryTimetable::new().with_count(task.clone(), args.retry_count);
    let tracker = TaskTracker::new(config.max_retries);
    let ctx = tracker
        .starting(&task, &timetable)
        .with_context(|| format!("{} is not an alert task", task))?;

    output::run_started(&ctx);

    let result = processor.run_alerts(&ctx).await;
    tracker.ending(&task);

    let exit = match result {
        Ok(summary) => {
            output::run_complete(&summary);
            None
        }
        Err(RunError::Retryable(failure)) => {
            output::retry_requested(&failure, ctx.is_final_retry());
            Some(EXIT_RETRY)
        }
        Err(RunError::Collaborator(failure)) => {
            output::collaborator_failure(&failure);
            Some(EXIT_FAILED)
        }
        Err(e) => return Err(e).context("Alert run failed"),
    };

    if args.print_metrics {
        print!("{}", encode_metrics());
    }

    if let Some(code) = exit {
        std::process::exit(code);
    }
    Ok(())
}
