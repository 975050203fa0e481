//! Enrollments service entry point.
//!
//! ```bash
//! # One unification pass, stats and pass report as JSON
//! DATABASE_URL=postgres://... enrollments snapshot
//!
//! # Same, including every canonical enrollment
//! DATABASE_URL=postgres://... enrollments snapshot --full
//!
//! # Keep the unified view warm until Ctrl-C
//! DATABASE_URL=postgres://... enrollments run
//! ```

use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use sea_orm::Database;
use tracing::info;

use campus_core::config::Config as _;
use campus_core::tracing::init_tracing;
use campus_enrollments::config::EnrollmentsConfig;
use campus_enrollments::domain::platform::MAPPING_VERSION;
use campus_enrollments::domain::types::EnrollmentStats;
use campus_enrollments::infra::db::DbEnrollmentStore;
use campus_enrollments::state::EnrollmentsApp;
use campus_enrollments::usecase::unify::UnifyEnrollmentsUseCase;

#[derive(Parser)]
#[command(about = "Unified view over legacy and normalized enrollments")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one unification pass and print the result as JSON.
    Snapshot {
        /// Include every canonical enrollment, not only the counters.
        #[arg(long)]
        full: bool,
    },
    /// Keep the unified view warm and log its stats until interrupted.
    Run {
        /// Seconds between stats log lines.
        #[arg(long, default_value_t = 60)]
        report_every: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = EnrollmentsConfig::from_env().context("load configuration")?;

    match args.command {
        Command::Snapshot { full } => snapshot(&config, full).await,
        Command::Run { report_every } => {
            run(&config, Duration::from_secs(report_every.max(1))).await
        }
    }
}

async fn snapshot(config: &EnrollmentsConfig, full: bool) -> Result<()> {
    let db = Database::connect(&config.database_url)
        .await
        .context("connect to database")?;
    let usecase = UnifyEnrollmentsUseCase::new(DbEnrollmentStore { db });

    let (enrollments, report) = usecase
        .execute_with_report()
        .await
        .context("unify enrollments")?;
    let stats = EnrollmentStats::from_enrollments(&enrollments);

    let mut out = serde_json::json!({
        "mappingVersion": MAPPING_VERSION,
        "stats": stats,
        "report": report,
    });
    if full {
        out["enrollments"] = serde_json::to_value(&enrollments)?;
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run(config: &EnrollmentsConfig, report_every: Duration) -> Result<()> {
    let app = EnrollmentsApp::init(config).await?;
    info!(
        mapping_version = MAPPING_VERSION,
        ttl_secs = config.cache_ttl_secs,
        soft_ttl_secs = config.cache_soft_ttl_secs,
        "enrollments service started"
    );

    let mut ticker = tokio::time::interval(report_every);
    ticker.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for ctrl-c")?;
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let counters = app.cache.counters();
                match app.cache.stats() {
                    Some(stats) => info!(
                        state = ?app.cache.state(),
                        total = stats.total,
                        from_legacy = stats.from_legacy,
                        from_normalized = stats.from_normalized,
                        migrated_ratio = stats.migrated_ratio,
                        refreshes = counters.refreshes,
                        failures = counters.failures,
                        invalidations = counters.invalidations,
                        "unified enrollments"
                    ),
                    None => info!(
                        state = ?app.cache.state(),
                        failures = counters.failures,
                        "unified enrollments not warm yet"
                    ),
                }
            }
        }
    }

    app.shutdown().await;
    Ok(())
}
