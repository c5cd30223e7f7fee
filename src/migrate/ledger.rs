use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// One confirmed per-record outcome. Appended exactly once per successfully
/// processed record; never mutated after write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub workos_user_id: String,
    pub auth0_user_id: String,
    pub created: bool,
}

/// Append-only outcome ledger.
///
/// Each outcome is one self-contained line, flushed before the caller
/// observes completion, so a crash after N lines means at most N records
/// confirmed. No deduplication against prior runs; resumption is by an
/// explicit caller-supplied skip offset computed from ledger contents.
pub struct Ledger {
    file: Mutex<File>,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open ledger {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub async fn append(&self, outcome: &MigrationOutcome) -> Result<()> {
        let line = serde_json::to_string(outcome).context("failed to encode ledger line")?;
        let mut file = self.file.lock().await;
        writeln!(file, "{line}").context("failed to append ledger line")?;
        file.flush().context("failed to flush ledger")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_flushed_line_per_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrated.ndjson");
        let ledger = Ledger::open(&path).unwrap();

        ledger
            .append(&MigrationOutcome {
                workos_user_id: "user_1".into(),
                auth0_user_id: "auth0|1".into(),
                created: true,
            })
            .await
            .unwrap();
        ledger
            .append(&MigrationOutcome {
                workos_user_id: "user_2".into(),
                auth0_user_id: "auth0|2".into(),
                created: false,
            })
            .await
            .unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: MigrationOutcome = serde_json::from_str(lines[0]).unwrap();
        assert!(first.created);
        assert_eq!(first.auth0_user_id, "auth0|1");
    }

    #[tokio::test]
    async fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrated.ndjson");
        for i in 0..2 {
            let ledger = Ledger::open(&path).unwrap();
            ledger
                .append(&MigrationOutcome {
                    workos_user_id: format!("user_{i}"),
                    auth0_user_id: format!("auth0|{i}"),
                    created: true,
                })
                .await
                .unwrap();
        }
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body.lines().count(), 2);
    }
}
