use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::dedupe::engine::{DecisionAction, ResolutionDecision};

/// Per-action decision totals, reported at end of run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub keep: usize,
    pub manual_review: usize,
    pub skip: usize,
}

/// Terminal summary object for a resolution batch.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DedupeSummary {
    pub total_emails: usize,
    pub actions: ActionCounts,
}

/// Three disjoint NDJSON decision sinks, selected solely by action.
/// Every email group lands in exactly one of them.
pub struct DecisionSinks {
    keep: Mutex<File>,
    manual_review: Mutex<File>,
    skip: Mutex<File>,
    dir: std::path::PathBuf,
}

impl DecisionSinks {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        let open = |name: &str| -> Result<Mutex<File>> {
            let path = dir.join(name);
            let file = File::create(&path)
                .with_context(|| format!("failed to create sink {}", path.display()))?;
            Ok(Mutex::new(file))
        };
        Ok(Self {
            keep: open("keep.ndjson")?,
            manual_review: open("manual_review.ndjson")?,
            skip: open("skip.ndjson")?,
            dir: dir.to_path_buf(),
        })
    }

    pub async fn write(&self, decision: &ResolutionDecision) -> Result<()> {
        let line = serde_json::to_string(decision).context("failed to encode decision")?;
        let sink = match decision.action {
            DecisionAction::Keep => &self.keep,
            DecisionAction::ManualReview => &self.manual_review,
            DecisionAction::Skip => &self.skip,
        };
        let mut file = sink.lock().await;
        writeln!(file, "{line}").context("failed to append decision")?;
        file.flush().context("failed to flush decision sink")?;
        Ok(())
    }

    pub fn write_summary(&self, summary: &DedupeSummary) -> Result<()> {
        let path = self.dir.join("summary.json");
        let body = serde_json::to_string_pretty(summary).context("failed to encode summary")?;
        fs::write(&path, body)
            .with_context(|| format!("failed to write summary {}", path.display()))
    }
}
