use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gridiron_data::config::PipelineConfig;
use gridiron_data::{pipeline, telemetry};

/// Recompute derived metrics for a season already in the store.
#[derive(Parser, Debug)]
#[command(name = "rederive")]
struct Args {
    #[arg(long)]
    season: u16,
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> Result<()> {
    telemetry::load_dotenv();
    telemetry::init_tracing();
    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let report = pipeline::rederive_season(&config, args.season)?;
    println!(
        "Derived {}/{} players for {} (failed {})",
        report.derived, report.players, args.season, report.failed
    );
    for err in report.errors.iter().take(6) {
        println!("   - {err}");
    }
    Ok(())
}
