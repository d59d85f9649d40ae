//! gridkeep-sweeper — standalone retention sweeper for the console cold
//! tier (§4.G: "a background sweeper deletes cold rows with timestamp <
//! now - retentionDays, using a bulk delete, not row-by-row").
//!
//! Runs alongside the main `gridkeep` binary, polling on a timer rather
//! than being woven into the request-handling process.

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use gridkeep::config::{DbArgs, NatsArgs};
use gridkeep::db::schemas::ConsoleArchiveRepository;
use gridkeep::db::Db;
use gridkeep::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "gridkeep-sweeper")]
#[command(about = "Cold-tier console history retention sweeper")]
struct SweeperArgs {
    #[command(flatten)]
    db: DbArgs,

    #[command(flatten)]
    #[allow(dead_code)]
    nats: NatsArgs,

    /// Cold-tier retention window in days (§4.G, default 30)
    #[arg(long, env = "CONSOLE_RETENTION_DAYS", default_value = "30")]
    retention_days: i64,

    /// Sweep interval in seconds
    #[arg(long, env = "SWEEPER_INTERVAL_SECS", default_value = "3600")]
    interval_secs: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "DEV_MODE", default_value = "false")]
    dev_mode: bool,
}

#[tokio::main]
async fn main() {
    let args = SweeperArgs::parse();
    logging::init(&args.log_level, args.dev_mode);

    let db = match Db::connect(&args.db).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "sweeper failed to connect to Postgres");
            std::process::exit(1);
        }
    };

    let retention = chrono::Duration::days(args.retention_days);
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs));

    info!(retention_days = args.retention_days, interval_secs = args.interval_secs, "sweeper started");

    loop {
        ticker.tick().await;
        let repo = ConsoleArchiveRepository::new(db.pool());
        match repo.delete_older_than(retention).await {
            Ok(deleted) => {
                metrics::record_retention_sweep(deleted);
                info!(deleted_rows = deleted, "retention sweep completed");
            }
            Err(e) => {
                error!(error = %e, "retention sweep failed");
            }
        }
    }
}
