use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::error::MigrateError;
use crate::migrate::backoff::BackoffController;
use crate::migrate::dispatcher::{Dispatcher, Task};
use crate::migrate::ledger::Ledger;
use crate::migrate::record::{RecordStream, SourceRecord};
use crate::migrate::report::{RunCounters, RunSummary};
use crate::migrate::worker::{MigrationWorker, UpsertOutcome};
use crate::providers::workos::TargetDirectory;

/// Whether the input is a fresh user export or previously exported mappings
/// being re-driven through the update path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Migrate,
    Replay,
}

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub input: PathBuf,
    pub ledger: PathBuf,
    pub concurrency: usize,
    /// Records before this read position are consumed but not dispatched.
    pub skip: usize,
    pub dry_run: bool,
    pub mode: RunMode,
    pub default_retry_after_secs: u64,
}

struct RunContext {
    dispatcher: Dispatcher,
    backoff: BackoffController,
    worker: MigrationWorker,
    counters: RunCounters,
    mode: RunMode,
    dry_run: bool,
}

/// One attempt at one record. On a rate limit the unit re-enters the queue
/// through the backoff controller and nowhere else, so a unit that fails
/// rate-limited n times is requeued exactly n times.
fn record_task(ctx: Arc<RunContext>, record: SourceRecord, idx: usize, attempt: u32) -> Task {
    Box::pin(async move {
        if ctx.dry_run {
            info!(record = idx, user = %record.user_id, "dry-run: would migrate");
            return;
        }
        if ctx.mode == RunMode::Replay && record.workos_user_id.is_none() {
            warn!(record = idx, user = %record.user_id, "replay record has no workos_user_id");
            RunCounters::bump(&ctx.counters.unresolved);
            return;
        }
        match ctx.worker.migrate(&record).await {
            Ok(UpsertOutcome::Created(_)) => RunCounters::bump(&ctx.counters.created),
            Ok(UpsertOutcome::Updated(_)) => RunCounters::bump(&ctx.counters.updated),
            Ok(UpsertOutcome::Unresolved(reason)) => {
                warn!(record = idx, user = %record.user_id, %reason, "record unresolved");
                RunCounters::bump(&ctx.counters.unresolved);
            }
            Err(MigrateError::RateLimited {
                service,
                retry_after_secs,
            }) => {
                RunCounters::bump(&ctx.counters.retries);
                warn!(record = idx, attempt, service, "worker rate limited; requeueing");
                let retry = record_task(ctx.clone(), record, idx, attempt + 1);
                ctx.backoff.throttle(retry_after_secs, retry).await;
            }
            Err(err) => {
                error!(record = idx, user = %record.user_id, error = %err, "permanent per-record failure");
                RunCounters::bump(&ctx.counters.failed);
            }
        }
    })
}

/// Drive the full pipeline: stream records in file order, dispatch each under
/// the concurrency cap, drain at end of stream, report.
pub async fn run_migration(
    target: Arc<dyn TargetDirectory>,
    opts: &MigrateOptions,
) -> Result<RunSummary> {
    let stream = RecordStream::open(&opts.input)?;
    let ledger = Arc::new(Ledger::open(&opts.ledger)?);
    let dispatcher = Dispatcher::new(opts.concurrency);

    info!(
        input = %opts.input.display(),
        ledger = %opts.ledger.display(),
        concurrency = dispatcher.capacity(),
        skip = opts.skip,
        dry_run = opts.dry_run,
        mode = ?opts.mode,
        "starting migration run"
    );

    let ctx = Arc::new(RunContext {
        dispatcher: dispatcher.clone(),
        backoff: BackoffController::new(dispatcher.clone(), opts.default_retry_after_secs),
        worker: MigrationWorker::new(target, ledger),
        counters: RunCounters::default(),
        mode: opts.mode,
        dry_run: opts.dry_run,
    });

    for (idx, parsed) in stream {
        RunCounters::bump(&ctx.counters.read);
        let record = match parsed {
            Ok(record) => record,
            Err(err) => {
                error!(record = idx, error = %err, "skipping malformed line");
                RunCounters::bump(&ctx.counters.parse_failures);
                continue;
            }
        };
        if idx < opts.skip {
            RunCounters::bump(&ctx.counters.skipped);
            continue;
        }
        ctx.dispatcher.wait_until_below(ctx.dispatcher.capacity()).await;
        ctx.dispatcher
            .submit(record_task(ctx.clone(), record, idx, 0))
            .await;
    }
    ctx.dispatcher.drain_to_idle().await;

    let summary = ctx.counters.snapshot();
    summary.log();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::worker::fake_directory::FakeDirectory;
    use std::io::Write;
    use std::sync::atomic::Ordering;

    fn write_input(dir: &tempfile::TempDir, lines: &[String]) -> PathBuf {
        let path = dir.path().join("export.ndjson");
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    fn export_line(n: usize) -> String {
        format!(r#"{{"user_id":"auth0|{n}","email":"user{n}@x.com","email_verified":true}}"#)
    }

    fn options(dir: &tempfile::TempDir, input: PathBuf, concurrency: usize) -> MigrateOptions {
        MigrateOptions {
            input,
            ledger: dir.path().join("migrated.ndjson"),
            concurrency,
            skip: 0,
            dry_run: false,
            mode: RunMode::Migrate,
            default_retry_after_secs: 0,
        }
    }

    fn ledger_count(opts: &MigrateOptions) -> usize {
        std::fs::read_to_string(&opts.ledger)
            .unwrap_or_default()
            .lines()
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn ten_records_complete_under_the_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let lines: Vec<_> = (0..10).map(export_line).collect();
        let input = write_input(&tmp, &lines);
        let opts = options(&tmp, input, 3);

        let fake = Arc::new(FakeDirectory::default());
        let summary = run_migration(fake.clone(), &opts).await.unwrap();

        assert_eq!(summary.completed(), 10);
        assert_eq!(summary.created, 10);
        assert_eq!(ledger_count(&opts), 10);
        assert!(fake.max_active.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_record_is_retried_exactly_once_per_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_input(&tmp, &[export_line(1)]);
        let opts = options(&tmp, input, 2);

        let fake = Arc::new(FakeDirectory::default());
        fake.push_create_failure(MigrateError::RateLimited {
            service: "workos",
            retry_after_secs: Some(5),
        });
        let summary = run_migration(fake.clone(), &opts).await.unwrap();

        assert_eq!(summary.retries, 1);
        assert_eq!(summary.completed(), 1);
        // One ledger line, never two, for the retried record.
        assert_eq!(ledger_count(&opts), 1);
        assert_eq!(fake.create_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_line_affects_only_its_own_position() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_input(
            &tmp,
            &[export_line(1), "not-json".to_string(), export_line(3)],
        );
        let opts = options(&tmp, input, 2);

        let summary = run_migration(Arc::new(FakeDirectory::default()), &opts)
            .await
            .unwrap();

        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.completed(), 2);
        assert_eq!(ledger_count(&opts), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_offset_counts_read_position_without_dispatching() {
        let tmp = tempfile::tempdir().unwrap();
        let lines: Vec<_> = (0..3).map(export_line).collect();
        let input = write_input(&tmp, &lines);
        let mut opts = options(&tmp, input, 2);
        opts.skip = 2;

        let fake = Arc::new(FakeDirectory::default());
        let summary = run_migration(fake.clone(), &opts).await.unwrap();

        assert_eq!(summary.read, 3);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.completed(), 1);
        assert_eq!(ledger_count(&opts), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_mode_soft_fails_records_without_a_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_input(
            &tmp,
            &[
                r#"{"auth0_user_id":"auth0|1","workos_user_id":"user_9"}"#.to_string(),
                r#"{"auth0_user_id":"auth0|2"}"#.to_string(),
            ],
        );
        let mut opts = options(&tmp, input, 2);
        opts.mode = RunMode::Replay;

        let fake = Arc::new(FakeDirectory::default());
        fake.seed("user_9", "a@x.com");
        let summary = run_migration(fake.clone(), &opts).await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(fake.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_reads_everything_and_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let lines: Vec<_> = (0..4).map(export_line).collect();
        let input = write_input(&tmp, &lines);
        let mut opts = options(&tmp, input, 2);
        opts.dry_run = true;

        let fake = Arc::new(FakeDirectory::default());
        let summary = run_migration(fake.clone(), &opts).await.unwrap();

        assert_eq!(summary.read, 4);
        assert_eq!(summary.completed(), 0);
        assert_eq!(ledger_count(&opts), 0);
        assert_eq!(fake.create_calls.load(Ordering::SeqCst), 0);
    }
}
