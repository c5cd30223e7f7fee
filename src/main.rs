use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use idp_migrate::cli::dedupe::{run_dedupe_cmd, DedupeCommandConfig};
use idp_migrate::cli::migrate::{run_migrate, MigrateCommandConfig};
use idp_migrate::logging::init_tracing;
use idp_migrate::util::env;

#[derive(Parser, Debug)]
#[command(name = "idpm", version, about = "Auth0 to WorkOS bulk migration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Migrate users from an Auth0 NDJSON export into WorkOS
    Migrate {
        /// Newline-delimited JSON user export
        #[arg(long)]
        input: PathBuf,
        /// Append-only outcome ledger (default: migrated.ndjson)
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// Maximum in-flight records (default: MIGRATE_CONCURRENCY or 8)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Read but do not dispatch the first N records (resume offset)
        #[arg(long, default_value_t = 0)]
        skip: usize,
        /// Log intended actions without writing to WorkOS or the ledger
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Re-drive previously exported id mappings through the update path
    Replay {
        /// Newline-delimited JSON mapping file ({auth0_user_id, workos_user_id})
        #[arg(long)]
        input: PathBuf,
        /// Append-only outcome ledger (default: migrated.ndjson)
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// Maximum in-flight records (default: MIGRATE_CONCURRENCY or 8)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Read but do not dispatch the first N records (resume offset)
        #[arg(long, default_value_t = 0)]
        skip: usize,
        /// Log intended actions without writing to WorkOS or the ledger
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Resolve duplicate-email account groups against the Auth0 tenant
    Dedupe {
        /// CSV of duplicate candidates (id, email, auth0_sub, ...)
        #[arg(long)]
        input: PathBuf,
        /// Directory for keep/manual_review/skip sinks (default: dedupe-out)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Maximum in-flight email groups (default: MIGRATE_CONCURRENCY or 8)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Query and decide without writing the sinks
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing("info")?;

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Migrate {
            input,
            ledger,
            concurrency,
            skip,
            dry_run,
        } => {
            run_migrate(MigrateCommandConfig {
                input,
                ledger,
                concurrency,
                skip,
                dry_run,
                replay: false,
            })
            .await
        }
        Commands::Replay {
            input,
            ledger,
            concurrency,
            skip,
            dry_run,
        } => {
            run_migrate(MigrateCommandConfig {
                input,
                ledger,
                concurrency,
                skip,
                dry_run,
                replay: true,
            })
            .await
        }
        Commands::Dedupe {
            input,
            out_dir,
            concurrency,
            dry_run,
        } => {
            run_dedupe_cmd(DedupeCommandConfig {
                input,
                out_dir,
                concurrency,
                dry_run,
            })
            .await
        }
    };

    if let Err(err) = &result {
        error!(error = ?err, "run aborted");
    }
    result
}
