//! openrocket_log: OpenRocket CSV export → base64 packet log.
//!
//! Default output is one `NavPacket` per line (for `decode_log`). With
//! `--ground-packet` every line is a full `GroundPacket`, replayable with
//! `ground_station --radio replay --replay-file <log>`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use prost::Message;

use ground_station::utils::openrocket::{add_noise, ground_packet, nav_packet, read_samples, write_b64_log};

#[derive(Debug, Parser)]
#[command(name = "openrocket_log", about = "Turn an OpenRocket CSV export into a packet log")]
struct Args {
    /// OpenRocket CSV (time, altitude, velocity, acceleration; no header)
    #[arg(short = 'f', long, default_value = "forte_openrocket.csv")]
    csv_file: PathBuf,

    /// Add Gaussian noise to simulate real sensor readings
    #[arg(short, long)]
    add_noise: bool,

    #[arg(short = 's', long, default_value_t = 0.05)]
    noise_std: f64,

    #[arg(short = 'l', long, default_value = "openrocket.log")]
    log_file: PathBuf,

    /// Write GroundPackets instead of bare NavPackets
    #[arg(long)]
    ground_packet: bool,

    #[arg(long, default_value = "TOM")]
    rocket_id: String,

    /// Launch site latitude for GroundPacket locations
    #[arg(long, default_value_t = 47.9650, allow_negative_numbers = true)]
    latitude: f64,

    #[arg(long, default_value_t = -81.8735, allow_negative_numbers = true)]
    longitude: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut samples = read_samples(&args.csv_file)
        .with_context(|| format!("reading {}", args.csv_file.display()))?;
    if args.add_noise {
        add_noise(&mut samples, args.noise_std, &mut rand::rng())?;
    }
    info!("[openrocket_log] {} samples from {}", samples.len(), args.csv_file.display());

    let written = if args.ground_packet {
        let origin = (args.latitude, args.longitude);
        write_b64_log(
            &args.log_file,
            samples
                .iter()
                .map(|s| ground_packet(s, &args.rocket_id, origin).encode_to_vec()),
        )?
    } else {
        write_b64_log(&args.log_file, samples.iter().map(|s| nav_packet(s).encode_to_vec()))?
    };

    info!("[openrocket_log] {} packets -> {}", written, args.log_file.display());
    Ok(())
}
