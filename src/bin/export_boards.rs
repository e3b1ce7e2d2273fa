use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gridiron_data::config::PipelineConfig;
use gridiron_data::{export, telemetry};

/// Write the season player, receiving and rushing boards to an .xlsx workbook.
#[derive(Parser, Debug)]
#[command(name = "export_boards")]
struct Args {
    /// Defaults to the latest ingested season.
    #[arg(long)]
    season: Option<u16>,
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long, default_value = "season_boards.xlsx")]
    out: PathBuf,
}

fn main() -> Result<()> {
    telemetry::load_dotenv();
    telemetry::init_tracing();
    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let report = export::export_season_boards(&config.db_path, args.season, &args.out)?;
    println!("Export complete: {}", args.out.display());
    match report.season {
        Some(season) => println!("Season: {season}"),
        None => println!("Season: n/a (store is empty)"),
    }
    println!("Players: {}", report.players);
    println!("Receiving rows: {}", report.receiving);
    println!("Rushing rows: {}", report.rushing);
    Ok(())
}
