//! openrocket.rs
//! OpenRocket flight export → packet logs usable by `ReplayRadio` and `decode_log`.
//!
//! Input: headerless CSV, columns time (s), altitude (m), velocity (m/s),
//! acceleration (m/s²). Lines starting with '#' are OpenRocket comments.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use prost::Message;
use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError};
use serde::Deserialize;
use thiserror::Error;

use crate::schema::{Altimeter, Gnss, GroundPacket, Imu, Location, NavPacket, Timestamp};

#[derive(Debug, Error)]
pub enum OpenRocketError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("noise standard deviation must be non-negative, got {0}")]
    NegativeStdDev(f64),

    #[error("invalid noise standard deviation: {0}")]
    Noise(#[from] NormalError),
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FlightSample {
    pub time: f64,
    pub altitude: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

pub fn read_samples(path: &Path) -> Result<Vec<FlightSample>, OpenRocketError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut samples = Vec::new();
    for row in reader.deserialize() {
        samples.push(row?);
    }
    Ok(samples)
}

/// Add zero-mean Gaussian noise to altitude, velocity and acceleration.
pub fn add_noise<R: Rng + ?Sized>(
    samples: &mut [FlightSample],
    std_dev: f64,
    rng: &mut R,
) -> Result<(), OpenRocketError> {
    // Normal::new only rejects non-finite values.
    if !(std_dev >= 0.0) {
        return Err(OpenRocketError::NegativeStdDev(std_dev));
    }
    let normal = Normal::new(0.0, std_dev)?;
    for s in samples.iter_mut() {
        s.altitude += normal.sample(rng);
        s.velocity += normal.sample(rng);
        s.acceleration += normal.sample(rng);
    }
    Ok(())
}

pub fn nav_packet(sample: &FlightSample) -> NavPacket {
    let ts = Timestamp::from_secs_f64(sample.time);
    NavPacket {
        timestamp: Some(ts),
        gnss: Some(Gnss {
            timestamp: Some(ts),
            altitude: sample.altitude,
            ..Gnss::default()
        }),
        imu0: Some(Imu {
            acc_x: sample.acceleration as f32,
            ..Imu::default()
        }),
        alt0: Some(Altimeter {
            altitude: sample.altitude,
        }),
        ..NavPacket::default()
    }
}

/// Wrap a sample in the radio packet a flight computer would send,
/// located at `origin` (lat, lon).
pub fn ground_packet(sample: &FlightSample, rocket_id: &str, origin: (f64, f64)) -> GroundPacket {
    GroundPacket {
        rocket_id: rocket_id.to_string(),
        location: Some(Location {
            latitude: origin.0,
            longitude: origin.1,
            altitude: sample.altitude,
        }),
        telemetry: nav_packet(sample).encode_to_vec(),
    }
}

/// Write one base64 line per encoded message. Returns the line count.
pub fn write_b64_log<I>(path: &Path, messages: I) -> Result<usize, OpenRocketError>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    let mut out = BufWriter::new(File::create(path)?);
    let mut n = 0;
    for bytes in messages {
        writeln!(out, "{}", BASE64.encode(bytes))?;
        n += 1;
    }
    out.flush()?;
    Ok(n)
}
