use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gridiron_data::config::PipelineConfig;
use gridiron_data::{server, telemetry};

/// Serve the read-only JSON API over the local store.
#[derive(Parser, Debug)]
#[command(name = "serve")]
struct Args {
    /// Listen address; defaults to API_BIND.
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    telemetry::load_dotenv();
    telemetry::init_tracing();
    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(bind) = args.bind {
        config.api_bind = bind;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(threads) = args.threads {
        config.api_threads = threads.clamp(1, 64);
    }
    server::serve(&config)
}
