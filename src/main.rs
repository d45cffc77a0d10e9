//! # Ground Station Entry Point
//! Receives rocket telemetry over LoRa and republishes it per rocket to live
//! visualization clients and/or CSV logs, optionally alongside a camera feed.
//!
//! ## Flow
//! - parse + validate configuration (clap)
//! - build and configure the radio (fatal on failure)
//! - open the camera (degrades to no camera on failure)
//! - start the station, wait for Ctrl-C, shut down in order
//!
//! Exit code is non-zero only when start-up fails.

use std::{thread, time::Duration};

use anyhow::Context;
use clap::Parser;
use log::info;

use ground_station::{
    station::{GroundStation, build_radio, open_camera},
    utils::{
        config::{GroundStationArgs, GroundStationConfig},
        signal::setup_ctrl_c_handler,
    },
};

const WAIT_POLL: Duration = Duration::from_millis(200);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GroundStationConfig::try_from(GroundStationArgs::parse())
        .context("invalid configuration")?;
    info!("[Main] configuration: {:?}", config);

    let running = setup_ctrl_c_handler().context("failed to install Ctrl-C handler")?;
    let radio = build_radio(&config).context("failed to open radio")?;
    let camera = open_camera(&config);

    let mut station = GroundStation::start(config, radio, camera, running)
        .context("ground station failed to start")?;

    if let Some(addr) = station.visualization_addr() {
        info!("[Main] visualization clients: connect to {}", addr);
    }
    info!("[Main] running, Ctrl-C to stop");

    while station.is_running() {
        thread::sleep(WAIT_POLL);
    }
    station.shutdown();
    Ok(())
}
