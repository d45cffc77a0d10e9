//! export.rs
//! CSV outputs and the periodic status line.
//! - `export_summary_csv`: final counters, one `metric,value` row each
//! - `convert_nav_log`: base64 `NavPacket` log → flattened CSV (gnss/imu/alt/magn columns)
//! - `spawn_status_reporter`: background thread logging counters every interval

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use log::{info, warn};
use prost::Message;
use serde::Serialize;
use thiserror::Error;

use crate::schema::NavPacket;
use crate::utils::metrics::{MetricsSnapshot, StationMetrics};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    metric: &'a str,
    value: u64,
}

/// Write `<dir>/<session>_summary.csv`.
pub fn export_summary_csv(
    dir: &Path,
    session: &str,
    snapshot: &MetricsSnapshot,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_summary.csv", session));
    let mut writer = csv::Writer::from_path(&path)?;
    for (metric, value) in snapshot.rows() {
        writer.serialize(SummaryRow {
            metric: &metric,
            value,
        })?;
    }
    writer.flush()?;
    info!("[Export] summary written to {}", path.display());
    Ok(path)
}

// ============================================================================
// NavPacket log conversion
// ============================================================================

/// One flattened `NavPacket`. Missing sub-messages come out as zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavCsvRow {
    #[serde(rename = "timestamp_ns")]
    pub timestamp_ns: u64,
    #[serde(rename = "gnss.latitude")]
    pub gnss_latitude: f64,
    #[serde(rename = "gnss.longitude")]
    pub gnss_longitude: f64,
    #[serde(rename = "gnss.altitude")]
    pub gnss_altitude: f64,
    #[serde(rename = "gnss.satellites")]
    pub gnss_satellites: u32,
    #[serde(rename = "imu0.acc_x")]
    pub imu0_acc_x: f32,
    #[serde(rename = "imu0.acc_y")]
    pub imu0_acc_y: f32,
    #[serde(rename = "imu0.acc_z")]
    pub imu0_acc_z: f32,
    #[serde(rename = "imu0.gyr_x")]
    pub imu0_gyr_x: f32,
    #[serde(rename = "imu0.gyr_y")]
    pub imu0_gyr_y: f32,
    #[serde(rename = "imu0.gyr_z")]
    pub imu0_gyr_z: f32,
    #[serde(rename = "imu1.acc_x")]
    pub imu1_acc_x: f32,
    #[serde(rename = "imu1.acc_y")]
    pub imu1_acc_y: f32,
    #[serde(rename = "imu1.acc_z")]
    pub imu1_acc_z: f32,
    #[serde(rename = "imu1.gyr_x")]
    pub imu1_gyr_x: f32,
    #[serde(rename = "imu1.gyr_y")]
    pub imu1_gyr_y: f32,
    #[serde(rename = "imu1.gyr_z")]
    pub imu1_gyr_z: f32,
    #[serde(rename = "imu2.acc_x")]
    pub imu2_acc_x: f32,
    #[serde(rename = "imu2.acc_y")]
    pub imu2_acc_y: f32,
    #[serde(rename = "imu2.acc_z")]
    pub imu2_acc_z: f32,
    #[serde(rename = "imu2.gyr_x")]
    pub imu2_gyr_x: f32,
    #[serde(rename = "imu2.gyr_y")]
    pub imu2_gyr_y: f32,
    #[serde(rename = "imu2.gyr_z")]
    pub imu2_gyr_z: f32,
    #[serde(rename = "alt0.altitude")]
    pub alt0_altitude: f64,
    #[serde(rename = "alt1.altitude")]
    pub alt1_altitude: f64,
    #[serde(rename = "alt2.altitude")]
    pub alt2_altitude: f64,
    #[serde(rename = "magn.x")]
    pub magn_x: f32,
    #[serde(rename = "magn.y")]
    pub magn_y: f32,
    #[serde(rename = "magn.z")]
    pub magn_z: f32,
}

impl From<&NavPacket> for NavCsvRow {
    fn from(p: &NavPacket) -> Self {
        let gnss = p.gnss.clone().unwrap_or_default();
        let imu0 = p.imu0.unwrap_or_default();
        let imu1 = p.imu1.unwrap_or_default();
        let imu2 = p.imu2.unwrap_or_default();
        let magn = p.magn.unwrap_or_default();
        Self {
            timestamp_ns: p.timestamp.map(|t| t.as_nanos()).unwrap_or(0),
            gnss_latitude: gnss.latitude,
            gnss_longitude: gnss.longitude,
            gnss_altitude: gnss.altitude,
            gnss_satellites: gnss.satellites,
            imu0_acc_x: imu0.acc_x,
            imu0_acc_y: imu0.acc_y,
            imu0_acc_z: imu0.acc_z,
            imu0_gyr_x: imu0.gyr_x,
            imu0_gyr_y: imu0.gyr_y,
            imu0_gyr_z: imu0.gyr_z,
            imu1_acc_x: imu1.acc_x,
            imu1_acc_y: imu1.acc_y,
            imu1_acc_z: imu1.acc_z,
            imu1_gyr_x: imu1.gyr_x,
            imu1_gyr_y: imu1.gyr_y,
            imu1_gyr_z: imu1.gyr_z,
            imu2_acc_x: imu2.acc_x,
            imu2_acc_y: imu2.acc_y,
            imu2_acc_z: imu2.acc_z,
            imu2_gyr_x: imu2.gyr_x,
            imu2_gyr_y: imu2.gyr_y,
            imu2_gyr_z: imu2.gyr_z,
            alt0_altitude: p.alt0.map(|a| a.altitude).unwrap_or(0.0),
            alt1_altitude: p.alt1.map(|a| a.altitude).unwrap_or(0.0),
            alt2_altitude: p.alt2.map(|a| a.altitude).unwrap_or(0.0),
            magn_x: magn.x,
            magn_y: magn.y,
            magn_z: magn.z,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub converted: usize,
    pub skipped: usize,
}

/// `flight.log` → `flight.csv`
pub fn csv_path_for(log: &Path) -> PathBuf {
    log.with_extension("csv")
}

/// Convert a base64-per-line `NavPacket` log into a flattened CSV.
/// Undecodable lines are skipped with a warning.
pub fn convert_nav_log(input: &Path, output: &Path) -> Result<ConversionStats, ExportError> {
    let reader = BufReader::new(File::open(input)?);
    let mut writer = csv::Writer::from_path(output)?;
    let mut stats = ConversionStats::default();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let packet = BASE64
            .decode(line)
            .map_err(|e| e.to_string())
            .and_then(|bytes| NavPacket::decode(bytes.as_slice()).map_err(|e| e.to_string()));
        match packet {
            Ok(packet) => {
                writer.serialize(NavCsvRow::from(&packet))?;
                stats.converted += 1;
            }
            Err(e) => {
                warn!("[Export] {}:{} skipped: {}", input.display(), lineno + 1, e);
                stats.skipped += 1;
            }
        }
    }

    writer.flush()?;
    Ok(stats)
}

// ============================================================================
// Status reporter
// ============================================================================

const STATUS_POLL: Duration = Duration::from_millis(100);

/// Log a one-line counter summary every `interval` until `running` clears.
/// Returns `None` when `interval` is zero.
pub fn spawn_status_reporter(
    metrics: Arc<StationMetrics>,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    let handle = thread::Builder::new()
        .name("status".into())
        .spawn(move || {
            let mut next = Instant::now() + interval;
            while running.load(Ordering::Acquire) {
                thread::sleep(STATUS_POLL.min(interval));
                if Instant::now() < next {
                    continue;
                }
                next += interval;
                log_status(&metrics.snapshot());
            }
        });
    match handle {
        Ok(h) => Some(h),
        Err(e) => {
            warn!("[Status] reporter not started: {}", e);
            None
        }
    }
}

pub fn log_status(s: &MetricsSnapshot) {
    info!(
        "[Status] rx={} decode_err={} radio_err={} routed={} unknown={} alt_rejected={} overflow={} published={} publish_fail={} camera={}",
        s.packets_received,
        s.decode_errors,
        s.radio_errors,
        s.routed,
        s.unknown_rocket,
        s.altitude_rejected,
        s.queue_overflow,
        s.published,
        s.publish_failures,
        s.camera_frames,
    );
}
