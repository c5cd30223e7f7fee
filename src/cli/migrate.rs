use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::migrate::backoff::DEFAULT_RETRY_AFTER_SECS;
use crate::migrate::run::{run_migration, MigrateOptions, RunMode};
use crate::providers::workos::WorkosProvider;
use crate::util::env;

#[derive(Debug, Clone, Default)]
pub struct MigrateCommandConfig {
    pub input: PathBuf,
    pub ledger: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub skip: usize,
    pub dry_run: bool,
    /// Re-drive exported id mappings through the update path instead of
    /// migrating a fresh export.
    pub replay: bool,
}

pub async fn run_migrate(cfg: MigrateCommandConfig) -> Result<()> {
    let api_key = env::workos_api_key()?;
    let base_url = std::env::var("WORKOS_BASE_URL").ok();
    let target = Arc::new(WorkosProvider::new(base_url.as_deref(), api_key, None)?);

    let opts = MigrateOptions {
        input: cfg.input,
        ledger: cfg
            .ledger
            .unwrap_or_else(|| PathBuf::from("migrated.ndjson")),
        concurrency: cfg
            .concurrency
            .unwrap_or_else(|| env::env_parse("MIGRATE_CONCURRENCY", 8usize)),
        skip: cfg.skip,
        dry_run: cfg.dry_run,
        mode: if cfg.replay {
            RunMode::Replay
        } else {
            RunMode::Migrate
        },
        default_retry_after_secs: env::env_parse(
            "MIGRATE_RETRY_AFTER_DEFAULT_SECS",
            DEFAULT_RETRY_AFTER_SECS,
        ),
    };
    run_migration(target, &opts).await?;
    Ok(())
}
