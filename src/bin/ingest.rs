use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gridiron_data::boxscore::PfrBoxscoreSource;
use gridiron_data::config::PipelineConfig;
use gridiron_data::nflverse::NflverseSource;
use gridiron_data::pipeline;
use gridiron_data::source::{BoxscoreSource, BulkSource, NoBoxscores};
use gridiron_data::telemetry;

/// Ingest one season: bulk play-by-play, boxscore supplements, then derived metrics.
#[derive(Parser, Debug)]
#[command(name = "ingest")]
struct Args {
    /// Season year, e.g. 2024.
    #[arg(long)]
    season: u16,
    /// SQLite path; defaults to GRIDIRON_DB_PATH or the app cache dir.
    #[arg(long)]
    db: Option<PathBuf>,
    /// Read pre-downloaded nflverse assets from this directory instead of the network.
    #[arg(long)]
    local_dir: Option<PathBuf>,
    /// Skip the PFR boxscore scrape.
    #[arg(long)]
    no_boxscores: bool,
    #[arg(long)]
    parallelism: Option<usize>,
}

fn main() -> Result<()> {
    telemetry::load_dotenv();
    telemetry::init_tracing();
    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(n) = args.parallelism {
        config.parallelism = n.clamp(1, 32);
    }

    let bulk: Box<dyn BulkSource> = match args.local_dir {
        Some(dir) => Box::new(NflverseSource::local(dir)),
        None => Box::new(NflverseSource::remote(&config)),
    };
    let boxscores: Box<dyn BoxscoreSource> = if args.no_boxscores {
        Box::new(NoBoxscores)
    } else {
        Box::new(PfrBoxscoreSource::new(&config))
    };

    let report = pipeline::ingest_season(&config, bulk.as_ref(), boxscores.as_ref(), args.season)?;

    println!("Ingest complete (run {})", report.run_id);
    println!("DB: {}", config.db_path.display());
    println!("Season: {}", report.season);
    println!("Games: {}/{} written", report.games_written, report.games_total);
    println!(
        "Boxscores: merged={} absent={} skipped={} failed={}",
        report.boxscores_merged,
        report.boxscores_absent,
        report.boxscores_skipped,
        report.boxscores_failed
    );
    println!(
        "Players derived: {} (failed {})",
        report.players_derived, report.derive_failed
    );
    println!("Rejected records: {}", report.rejects);
    if !report.errors.is_empty() {
        println!("  errors: {}", report.errors.len());
        for err in report.errors.iter().take(6) {
            println!("   - {err}");
        }
    }
    Ok(())
}
