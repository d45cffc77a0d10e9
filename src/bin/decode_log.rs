//! decode_log: base64 `NavPacket` log → flattened CSV next to it.
//!
//! `decode_log flight.log` writes `flight.csv` (or `--output`).

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use ground_station::utils::export::{convert_nav_log, csv_path_for};

#[derive(Debug, Parser)]
#[command(name = "decode_log", about = "Convert a base64 NavPacket log to CSV")]
struct Args {
    /// Log with one base64-encoded NavPacket per line
    input: PathBuf,

    /// Output CSV (default: input with a .csv extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let output = args.output.unwrap_or_else(|| csv_path_for(&args.input));
    let stats = convert_nav_log(&args.input, &output)
        .with_context(|| format!("converting {}", args.input.display()))?;

    info!(
        "[decode_log] {} packets -> {}",
        stats.converted,
        output.display()
    );
    if stats.skipped > 0 {
        warn!("[decode_log] {} lines could not be decoded", stats.skipped);
    }
    Ok(())
}
