use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::dedupe::input::{read_groups, DuplicateCandidate};
use crate::dedupe::sinks::{ActionCounts, DecisionSinks, DedupeSummary};
use crate::error::MigrateError;
use crate::migrate::backoff::BackoffController;
use crate::migrate::dispatcher::{Dispatcher, Task};
use crate::migrate::report::RunCounters;
use crate::providers::auth0::{AuthoritativeAccount, AuthoritativeSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Keep,
    Skip,
    ManualReview,
}

/// Disposition for one email group. Written to exactly one sink.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionDecision {
    pub email: String,
    pub action: DecisionAction,
    /// Every candidate in the group, regardless of action.
    pub duplicates: Vec<DuplicateCandidate>,
    pub chosen_candidate: Option<DuplicateCandidate>,
    pub matched_auth0_account: Option<AuthoritativeAccount>,
    pub reason: String,
    pub requires_manual_review: bool,
}

/// Order survivors best-first: descending authoritative login count (missing
/// counts as 0), then descending last-active timestamp with a known timestamp
/// always outranking an unknown one. Remaining ties keep input order.
fn rank_survivors(survivors: &mut [(&DuplicateCandidate, &AuthoritativeAccount)]) {
    survivors.sort_by(|a, b| {
        let logins_a = a.1.logins_count.unwrap_or(0);
        let logins_b = b.1.logins_count.unwrap_or(0);
        logins_b
            .cmp(&logins_a)
            .then_with(|| b.1.last_login.cmp(&a.1.last_login))
    });
}

/// Decide one email group against the authoritative account map.
/// Deterministic: same inputs, same decision.
pub fn decide(
    email: &str,
    candidates: &[DuplicateCandidate],
    authoritative: &HashMap<String, AuthoritativeAccount>,
) -> ResolutionDecision {
    let mut survivors: Vec<(&DuplicateCandidate, &AuthoritativeAccount)> = candidates
        .iter()
        .filter_map(|c| authoritative.get(&c.auth0_sub).map(|a| (c, a)))
        .collect();

    match survivors.len() {
        0 => ResolutionDecision {
            email: email.to_string(),
            action: DecisionAction::Skip,
            duplicates: candidates.to_vec(),
            chosen_candidate: None,
            matched_auth0_account: None,
            reason: "all accounts deleted upstream".to_string(),
            requires_manual_review: false,
        },
        1 => {
            let (candidate, account) = survivors[0];
            ResolutionDecision {
                email: email.to_string(),
                action: DecisionAction::Keep,
                duplicates: candidates.to_vec(),
                chosen_candidate: Some(candidate.clone()),
                matched_auth0_account: Some(account.clone()),
                reason: "single surviving account".to_string(),
                requires_manual_review: false,
            }
        }
        k => {
            rank_survivors(&mut survivors);
            let (candidate, account) = survivors[0];
            ResolutionDecision {
                email: email.to_string(),
                action: DecisionAction::ManualReview,
                duplicates: candidates.to_vec(),
                chosen_candidate: Some(candidate.clone()),
                matched_auth0_account: Some(account.clone()),
                reason: format!("{k} accounts survive; manual review required"),
                requires_manual_review: true,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupeOptions {
    pub input: PathBuf,
    pub out_dir: PathBuf,
    pub concurrency: usize,
    pub dry_run: bool,
    pub default_retry_after_secs: u64,
}

struct DedupeContext {
    dispatcher: Dispatcher,
    backoff: BackoffController,
    source: Arc<dyn AuthoritativeSource>,
    sinks: Option<DecisionSinks>,
    keep: AtomicUsize,
    manual_review: AtomicUsize,
    skip: AtomicUsize,
    retries: AtomicUsize,
    failed: AtomicUsize,
}

/// One attempt at one email group. Rate limits re-enter the queue through the
/// backoff controller, same as record tasks in the migration pass.
fn group_task(
    ctx: Arc<DedupeContext>,
    email: String,
    candidates: Vec<DuplicateCandidate>,
    attempt: u32,
) -> Task {
    Box::pin(async move {
        match ctx.source.users_by_email(&email).await {
            Ok(authoritative) => {
                let decision = decide(&email, &candidates, &authoritative);
                let counter = match decision.action {
                    DecisionAction::Keep => &ctx.keep,
                    DecisionAction::ManualReview => &ctx.manual_review,
                    DecisionAction::Skip => &ctx.skip,
                };
                match &ctx.sinks {
                    Some(sinks) => {
                        if let Err(err) = sinks.write(&decision).await {
                            error!(email = %decision.email, error = %err, "failed to write decision");
                            RunCounters::bump(&ctx.failed);
                            return;
                        }
                    }
                    None => {
                        info!(email = %decision.email, action = ?decision.action,
                              reason = %decision.reason, "dry-run: decision not written");
                    }
                }
                RunCounters::bump(counter);
            }
            Err(MigrateError::RateLimited {
                service,
                retry_after_secs,
            }) => {
                RunCounters::bump(&ctx.retries);
                warn!(%email, attempt, service, "authoritative re-query rate limited; requeueing");
                let retry = group_task(ctx.clone(), email, candidates, attempt + 1);
                ctx.backoff.throttle(retry_after_secs, retry).await;
            }
            Err(err) => {
                error!(%email, error = %err, "authoritative re-query failed for group");
                RunCounters::bump(&ctx.failed);
            }
        }
    })
}

/// Batch pass: resolve every email group under the concurrency cap, writing
/// each decision to exactly one sink, then report the summary.
pub async fn run_dedupe(
    source: Arc<dyn AuthoritativeSource>,
    opts: &DedupeOptions,
) -> Result<DedupeSummary> {
    let groups = read_groups(&opts.input)?;
    let total_emails = groups.len();
    let dispatcher = Dispatcher::new(opts.concurrency);

    info!(
        input = %opts.input.display(),
        out_dir = %opts.out_dir.display(),
        total_emails,
        concurrency = dispatcher.capacity(),
        dry_run = opts.dry_run,
        "starting duplicate resolution"
    );

    let sinks = if opts.dry_run {
        None
    } else {
        Some(DecisionSinks::create(&opts.out_dir)?)
    };
    let ctx = Arc::new(DedupeContext {
        dispatcher: dispatcher.clone(),
        backoff: BackoffController::new(dispatcher.clone(), opts.default_retry_after_secs),
        source,
        sinks,
        keep: AtomicUsize::new(0),
        manual_review: AtomicUsize::new(0),
        skip: AtomicUsize::new(0),
        retries: AtomicUsize::new(0),
        failed: AtomicUsize::new(0),
    });

    for (email, candidates) in groups {
        ctx.dispatcher.wait_until_below(ctx.dispatcher.capacity()).await;
        ctx.dispatcher
            .submit(group_task(ctx.clone(), email, candidates, 0))
            .await;
    }
    ctx.dispatcher.drain_to_idle().await;

    use std::sync::atomic::Ordering;
    let summary = DedupeSummary {
        total_emails,
        actions: ActionCounts {
            keep: ctx.keep.load(Ordering::Relaxed),
            manual_review: ctx.manual_review.load(Ordering::Relaxed),
            skip: ctx.skip.load(Ordering::Relaxed),
        },
    };
    if let Some(sinks) = &ctx.sinks {
        sinks.write_summary(&summary)?;
    }
    info!(
        total_emails = summary.total_emails,
        keep = summary.actions.keep,
        manual_review = summary.actions.manual_review,
        skip = summary.actions.skip,
        retries = ctx.retries.load(Ordering::Relaxed),
        failed = ctx.failed.load(Ordering::Relaxed),
        "duplicate resolution finished"
    );
    Ok(summary)
}
