use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::dedupe::engine::{run_dedupe, DedupeOptions};
use crate::migrate::backoff::DEFAULT_RETRY_AFTER_SECS;
use crate::providers::auth0::Auth0Provider;
use crate::util::env;

#[derive(Debug, Clone, Default)]
pub struct DedupeCommandConfig {
    pub input: PathBuf,
    pub out_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub dry_run: bool,
}

pub async fn run_dedupe_cmd(cfg: DedupeCommandConfig) -> Result<()> {
    let base_url = env::auth0_base_url()?;
    let token = env::auth0_mgmt_token()?;
    let source = Arc::new(Auth0Provider::new(&base_url, token, None)?);

    let opts = DedupeOptions {
        input: cfg.input,
        out_dir: cfg.out_dir.unwrap_or_else(|| PathBuf::from("dedupe-out")),
        concurrency: cfg
            .concurrency
            .unwrap_or_else(|| env::env_parse("MIGRATE_CONCURRENCY", 8usize)),
        dry_run: cfg.dry_run,
        default_retry_after_secs: env::env_parse(
            "MIGRATE_RETRY_AFTER_DEFAULT_SECS",
            DEFAULT_RETRY_AFTER_SECS,
        ),
    };
    let summary = run_dedupe(source, &opts).await?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
