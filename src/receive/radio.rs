//! radio.rs
//! LoRa radio interface consumed by the radio reader.
//!
//! The reader only needs `receive` and the signal accessors; `configure` is called
//! once by the station during start-up and `release` once after every worker joined.

use std::{io, time::Duration};

use serde::Serialize;
use thiserror::Error;

/// Bandwidths supported by SX127x-class LoRa modems (Hz).
pub const LORA_BANDWIDTHS_HZ: &[u32] = &[
    7_800, 10_400, 15_600, 20_800, 31_250, 41_700, 62_500, 125_000, 250_000, 500_000,
];

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("invalid radio configuration: {0}")]
    InvalidConfig(String),

    #[error("radio used before configure()")]
    NotConfigured,

    #[error("radio I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("radio hardware fault: {0}")]
    Hardware(String),
}

/// LoRa tuning parameters. Immutable after start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RadioConfig {
    pub frequency_hz: u64,
    pub bandwidth_hz: u32,
    pub spreading_factor: u8,
    /// Denominator of the 4/x coding rate.
    pub coding_rate: u8,
    pub preamble_length: u16,
    pub sync_word: u8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 915_000_000,
            bandwidth_hz: 250_000,
            spreading_factor: 10,
            coding_rate: 8,
            preamble_length: 8,
            sync_word: 0x34,
        }
    }
}

impl RadioConfig {
    pub fn validate(&self) -> Result<(), RadioError> {
        if !(137_000_000..=1_020_000_000).contains(&self.frequency_hz) {
            return Err(RadioError::InvalidConfig(format!(
                "frequency {} Hz outside 137-1020 MHz",
                self.frequency_hz
            )));
        }
        if !LORA_BANDWIDTHS_HZ.contains(&self.bandwidth_hz) {
            return Err(RadioError::InvalidConfig(format!(
                "unsupported bandwidth {} Hz",
                self.bandwidth_hz
            )));
        }
        if !(6..=12).contains(&self.spreading_factor) {
            return Err(RadioError::InvalidConfig(format!(
                "spreading factor {} outside 6-12",
                self.spreading_factor
            )));
        }
        if !(5..=8).contains(&self.coding_rate) {
            return Err(RadioError::InvalidConfig(format!(
                "coding rate 4/{} outside 4/5-4/8",
                self.coding_rate
            )));
        }
        if self.preamble_length < 6 {
            return Err(RadioError::InvalidConfig(format!(
                "preamble length {} below 6 symbols",
                self.preamble_length
            )));
        }
        Ok(())
    }
}

pub trait Radio: Send {
    fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError>;

    /// Wait up to `timeout` for one packet. `Ok(None)` means nothing arrived.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, RadioError>;

    /// RSSI of the last received packet in dBm.
    fn last_rssi(&self) -> Option<f32>;

    /// SNR of the last received packet in dB.
    fn last_snr(&self) -> Option<f32>;

    /// Put the modem to sleep and free the bus. Called once during shutdown.
    fn release(&mut self) {}
}

impl<R: Radio + ?Sized> Radio for Box<R> {
    fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        (**self).configure(config)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, RadioError> {
        (**self).receive(timeout)
    }

    fn last_rssi(&self) -> Option<f32> {
        (**self).last_rssi()
    }

    fn last_snr(&self) -> Option<f32> {
        (**self).last_snr()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RadioConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let bad_sf = RadioConfig {
            spreading_factor: 13,
            ..RadioConfig::default()
        };
        assert!(bad_sf.validate().is_err());

        let bad_bw = RadioConfig {
            bandwidth_hz: 300_000,
            ..RadioConfig::default()
        };
        assert!(bad_bw.validate().is_err());

        let bad_cr = RadioConfig {
            coding_rate: 4,
            ..RadioConfig::default()
        };
        assert!(bad_cr.validate().is_err());
    }
}
