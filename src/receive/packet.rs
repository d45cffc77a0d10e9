//! packet.rs
//! Data carried from the radio into the decoder and router.

use std::time::{SystemTime, UNIX_EPOCH};

/// Signal quality reported by the radio for the most recently received packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalMetrics {
    pub rssi_dbm: f32,
    pub snr_db: f32,
}

/// Raw bytes as they came off the radio. Immutable once received.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPacket {
    pub bytes: Vec<u8>,
    /// Receive time, nanoseconds since the Unix epoch.
    pub received_ns: u64,
    pub signal: Option<SignalMetrics>,
}

impl TelemetryPacket {
    pub fn new(bytes: Vec<u8>, received_ns: u64, signal: Option<SignalMetrics>) -> Self {
        Self {
            bytes,
            received_ns,
            signal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// Structured result of decoding a `TelemetryPacket`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub rocket_id: String,
    pub location: Option<LocationFix>,
    pub telemetry: Vec<u8>,
    pub signal: Option<SignalMetrics>,
    pub received_ns: u64,
}

/// Nanoseconds since the Unix epoch; zero if the clock is before 1970.
pub fn unix_now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
