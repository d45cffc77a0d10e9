//! simulated.rs
//! Radios that need no hardware.
//! - `SimulatedRadio`: synthesizes a flight profile per configured rocket, with noisy
//!   RSSI/SNR and optional deliberately corrupted packets
//! - `ReplayRadio`: replays a newline-delimited base64 packet log at a fixed rate

use std::{
    fs,
    path::Path,
    time::{Duration, Instant},
};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use log::{debug, warn};
use prost::Message;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::receive::radio::{Radio, RadioConfig, RadioError};
use crate::schema::{Altimeter, GroundPacket, Location, NavPacket, Timestamp};
use crate::receive::packet::unix_now_ns;
use crate::utils::pacing::Pacer;

/// Launch site used as the origin of simulated flights.
const ORIGIN_LAT: f64 = 47.9650;
const ORIGIN_LON: f64 = -81.8735;

pub struct SimulatedRadio {
    rockets: Vec<String>,
    pacer: Pacer,
    rng: StdRng,
    corrupt_every: Option<u64>,
    seq: u64,
    started: Instant,
    config: Option<RadioConfig>,
    last_rssi: Option<f32>,
    last_snr: Option<f32>,
}

impl SimulatedRadio {
    pub fn new(rockets: Vec<String>, period: Duration) -> Self {
        Self {
            rockets,
            pacer: Pacer::new(period),
            rng: StdRng::from_os_rng(),
            corrupt_every: None,
            seq: 0,
            started: Instant::now(),
            config: None,
            last_rssi: None,
            last_snr: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Every `every`-th packet is replaced with bytes that fail to decode.
    pub fn with_corruption(mut self, every: u64) -> Self {
        self.corrupt_every = (every > 0).then_some(every);
        self
    }

    fn next_packet(&mut self) -> Vec<u8> {
        if let Some(every) = self.corrupt_every {
            if self.seq % every == 0 {
                let len = self.rng.random_range(1..=16);
                return vec![0xFF; len];
            }
        }

        if self.rockets.is_empty() {
            return Vec::new();
        }
        let idx = (self.seq as usize) % self.rockets.len();
        let t = self.started.elapsed().as_secs_f64();

        // Boost/coast/descent as a slow half-cosine, offset per rocket.
        let phase = t / 30.0 + idx as f64;
        let altitude = 1_500.0 * (1.0 - phase.cos()) + self.rng.random_range(-2.0..2.0);
        let latitude = ORIGIN_LAT + 1e-4 * phase.sin();
        let longitude = ORIGIN_LON + 1e-4 * (phase * 0.5).sin();

        let now_ns = unix_now_ns();
        let nav = NavPacket {
            timestamp: Some(Timestamp::from_nanos(now_ns)),
            alt0: Some(Altimeter { altitude }),
            ..NavPacket::default()
        };

        GroundPacket {
            rocket_id: self.rockets[idx].clone(),
            location: Some(Location {
                latitude,
                longitude,
                altitude,
            }),
            telemetry: nav.encode_to_vec(),
        }
        .encode_to_vec()
    }
}

impl Radio for SimulatedRadio {
    fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        config.validate()?;
        debug!("[SimulatedRadio] configured {:?}", config);
        self.config = Some(*config);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, RadioError> {
        if self.config.is_none() {
            return Err(RadioError::NotConfigured);
        }
        if !self.pacer.wait(timeout) {
            return Ok(None);
        }

        self.seq += 1;
        self.last_rssi = Some(self.rng.random_range(-120.0..-40.0));
        self.last_snr = Some(self.rng.random_range(-10.0..12.0));
        Ok(Some(self.next_packet()))
    }

    fn last_rssi(&self) -> Option<f32> {
        self.last_rssi
    }

    fn last_snr(&self) -> Option<f32> {
        self.last_snr
    }

    fn release(&mut self) {
        self.config = None;
    }
}

pub struct ReplayRadio {
    packets: Vec<Vec<u8>>,
    cursor: usize,
    looping: bool,
    pacer: Pacer,
    configured: bool,
}

impl ReplayRadio {
    pub fn from_packets(packets: Vec<Vec<u8>>, period: Duration) -> Self {
        Self {
            packets,
            cursor: 0,
            looping: false,
            pacer: Pacer::new(period),
            configured: false,
        }
    }

    /// Load a log with one base64-encoded packet per line. Lines that are not
    /// valid base64 are skipped.
    pub fn from_file(path: &Path, period: Duration) -> Result<Self, RadioError> {
        let text = fs::read_to_string(path)?;
        let mut packets = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match BASE64.decode(line) {
                Ok(bytes) => packets.push(bytes),
                Err(e) => warn!("[ReplayRadio] {}:{} skipped: {}", path.display(), lineno + 1, e),
            }
        }
        if packets.is_empty() {
            return Err(RadioError::InvalidConfig(format!(
                "replay log {} holds no packets",
                path.display()
            )));
        }
        Ok(Self::from_packets(packets, period))
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn remaining(&self) -> usize {
        self.packets.len().saturating_sub(self.cursor)
    }
}

impl Radio for ReplayRadio {
    fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        config.validate()?;
        self.configured = true;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, RadioError> {
        if !self.configured {
            return Err(RadioError::NotConfigured);
        }
        if self.cursor >= self.packets.len() {
            if self.looping && !self.packets.is_empty() {
                self.cursor = 0;
            } else {
                std::thread::sleep(timeout);
                return Ok(None);
            }
        }
        if !self.pacer.wait(timeout) {
            return Ok(None);
        }

        let bytes = self.packets[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(bytes))
    }

    // Replayed logs carry no link measurements.
    fn last_rssi(&self) -> Option<f32> {
        None
    }

    fn last_snr(&self) -> Option<f32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receive::decoder::decode_ground_packet;
    use std::io::Write;

    #[test]
    fn simulated_radio_requires_configure() {
        let mut radio = SimulatedRadio::new(vec!["TOM".into()], Duration::from_millis(1));
        assert!(matches!(
            radio.receive(Duration::from_millis(5)),
            Err(RadioError::NotConfigured)
        ));
    }

    #[test]
    fn simulated_radio_emits_decodable_packets_with_signal() {
        let mut radio = SimulatedRadio::new(vec!["TOM".into(), "FORTE".into()], Duration::from_millis(1))
            .with_seed(7);
        radio.configure(&RadioConfig::default()).unwrap();

        let mut seen = Vec::new();
        while seen.len() < 4 {
            if let Some(bytes) = radio.receive(Duration::from_millis(50)).unwrap() {
                seen.push(decode_ground_packet(&bytes).unwrap().rocket_id);
                assert!(radio.last_rssi().is_some());
                assert!(radio.last_snr().is_some());
            }
        }
        assert!(seen.contains(&"TOM".to_string()));
        assert!(seen.contains(&"FORTE".to_string()));
    }

    #[test]
    fn corruption_produces_undecodable_packets() {
        let mut radio = SimulatedRadio::new(vec!["TOM".into()], Duration::from_millis(1))
            .with_seed(1)
            .with_corruption(2);
        radio.configure(&RadioConfig::default()).unwrap();

        let mut results = Vec::new();
        while results.len() < 4 {
            if let Some(bytes) = radio.receive(Duration::from_millis(50)).unwrap() {
                results.push(decode_ground_packet(&bytes).is_ok());
            }
        }
        assert_eq!(results, vec![true, false, true, false]);
    }

    #[test]
    fn replay_radio_reads_base64_log_and_stops() {
        let pkt = GroundPacket {
            rocket_id: "TOM".into(),
            location: None,
            telemetry: vec![1],
        }
        .encode_to_vec();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", BASE64.encode(&pkt)).unwrap();
        writeln!(file, "not base64 !!").unwrap();
        writeln!(file, "{}", BASE64.encode(&pkt)).unwrap();

        let mut radio = ReplayRadio::from_file(file.path(), Duration::from_millis(1)).unwrap();
        radio.configure(&RadioConfig::default()).unwrap();
        assert_eq!(radio.remaining(), 2);

        let mut got = 0;
        for _ in 0..50 {
            if radio.receive(Duration::from_millis(20)).unwrap().is_some() {
                got += 1;
            }
            if radio.remaining() == 0 {
                break;
            }
        }
        assert_eq!(got, 2);
        assert_eq!(radio.receive(Duration::from_millis(1)).unwrap(), None);
    }

    #[test]
    fn replay_radio_rejects_empty_log() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(ReplayRadio::from_file(file.path(), Duration::from_millis(1)).is_err());
    }
}
