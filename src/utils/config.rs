//! config.rs
//! Start-up configuration: clap arguments → validated, immutable `GroundStationConfig`.

use std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::{Parser, ValueEnum};
use serde::Serialize;
use thiserror::Error;

use crate::publish::queue::DEFAULT_QUEUE_CAPACITY;
use crate::receive::radio::{RadioConfig, RadioError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one rocket id is required")]
    NoRockets,

    #[error("rocket id {0:?} is empty or contains '/' or whitespace")]
    InvalidRocketId(String),

    #[error("rocket id {0:?} given more than once")]
    DuplicateRocket(String),

    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("--radio replay needs --replay-file")]
    MissingReplayFile,

    #[error("--enable-camera needs --camera-dir")]
    MissingCameraDir,

    #[error("camera frame rate {0} is not a positive number")]
    InvalidCameraFps(f64),

    #[error(transparent)]
    Radio(#[from] RadioError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioSource {
    /// Synthesized flights for the configured rockets.
    Simulated,
    /// Packets replayed from a base64 log.
    Replay,
}

#[derive(Debug, Parser)]
#[command(name = "ground_station", about = "LoRa rocket ground station: radio → decode → route → visualization / log")]
pub struct GroundStationArgs {
    /// Visualization server address
    #[arg(short, long, default_value = "0.0.0.0")]
    pub address: IpAddr,

    /// Visualization server port
    #[arg(short, long, default_value_t = 8765)]
    pub port: u16,

    #[arg(short = 'n', long, default_value = "ground control")]
    pub server_name: String,

    /// Do not start the visualization server
    #[arg(long)]
    pub no_visualization: bool,

    /// Rocket id to accept; repeat for several rockets
    #[arg(short, long = "rocket", default_values_t = vec!["TOM".to_string()])]
    pub rockets: Vec<String>,

    /// Log every channel to CSV files under --log-dir
    #[arg(short = 'l', long)]
    pub enable_logging: bool,

    #[arg(short = 'd', long, default_value = "logs")]
    pub log_dir: PathBuf,

    #[arg(long)]
    pub enable_camera: bool,

    /// Directory of JPEG/PNG frames served as the camera feed
    #[arg(long)]
    pub camera_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 5.0)]
    pub camera_fps: f64,

    #[arg(long, value_enum, default_value_t = RadioSource::Simulated)]
    pub radio: RadioSource,

    #[arg(long)]
    pub replay_file: Option<PathBuf>,

    /// Restart the replay log when it runs out
    #[arg(long)]
    pub replay_loop: bool,

    /// Period between simulated or replayed packets
    #[arg(long, default_value_t = 100)]
    pub packet_period_ms: u64,

    /// Simulated radio: corrupt every Nth packet (0 = never)
    #[arg(long, default_value_t = 0)]
    pub corrupt_every: u64,

    #[arg(long, default_value_t = 915_000_000)]
    pub frequency: u64,

    #[arg(long, default_value_t = 250_000)]
    pub bandwidth: u32,

    #[arg(long, default_value_t = 10)]
    pub spreading_factor: u8,

    /// Coding rate denominator (4/x)
    #[arg(long, default_value_t = 8)]
    pub coding_rate: u8,

    #[arg(long, default_value_t = 8)]
    pub preamble_len: u16,

    /// Decimal or 0x-prefixed hex
    #[arg(long, default_value = "0x34", value_parser = parse_u8_maybe_hex)]
    pub sync_word: u8,

    #[arg(long, default_value_t = 500)]
    pub radio_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Publisher wait on an empty queue before re-checking for shutdown
    #[arg(long, default_value_t = 1000)]
    pub publish_timeout_ms: u64,

    /// Pin the radio reader thread to this CPU core
    #[arg(long)]
    pub radio_core: Option<usize>,

    /// Seconds between status lines (0 = off)
    #[arg(long, default_value_t = 10)]
    pub status_interval_secs: u64,
}

fn parse_u8_maybe_hex(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid byte {:?}: {}", s, e))
}

#[derive(Debug, Clone, Serialize)]
pub struct GroundStationConfig {
    pub server_name: String,
    pub server_addr: SocketAddr,
    pub enable_visualization: bool,
    pub rockets: Vec<String>,
    pub radio: RadioConfig,
    pub radio_source: RadioSource,
    pub replay_file: Option<PathBuf>,
    pub replay_loop: bool,
    pub packet_period: Duration,
    pub corrupt_every: u64,
    pub enable_logging: bool,
    pub log_dir: PathBuf,
    pub enable_camera: bool,
    pub camera_dir: Option<PathBuf>,
    pub camera_fps: f64,
    pub radio_timeout: Duration,
    pub publish_timeout: Duration,
    pub queue_capacity: usize,
    pub radio_core: Option<usize>,
    /// Zero disables the periodic status line.
    pub status_interval: Duration,
}

impl Default for GroundStationConfig {
    fn default() -> Self {
        Self {
            server_name: "ground control".into(),
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8765)),
            enable_visualization: true,
            rockets: vec!["TOM".into()],
            radio: RadioConfig::default(),
            radio_source: RadioSource::Simulated,
            replay_file: None,
            replay_loop: false,
            packet_period: Duration::from_millis(100),
            corrupt_every: 0,
            enable_logging: false,
            log_dir: PathBuf::from("logs"),
            enable_camera: false,
            camera_dir: None,
            camera_fps: 5.0,
            radio_timeout: Duration::from_millis(500),
            publish_timeout: Duration::from_secs(1),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            radio_core: None,
            status_interval: Duration::from_secs(10),
        }
    }
}

impl GroundStationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rockets.is_empty() {
            return Err(ConfigError::NoRockets);
        }
        let mut seen = HashSet::new();
        for id in &self.rockets {
            if id.is_empty() || id.contains('/') || id.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidRocketId(id.clone()));
            }
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::DuplicateRocket(id.clone()));
            }
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.radio_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("radio timeout"));
        }
        if self.publish_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("publish timeout"));
        }
        if self.packet_period.is_zero() {
            return Err(ConfigError::ZeroTimeout("packet period"));
        }

        if self.radio_source == RadioSource::Replay && self.replay_file.is_none() {
            return Err(ConfigError::MissingReplayFile);
        }
        if self.enable_camera {
            if self.camera_dir.is_none() {
                return Err(ConfigError::MissingCameraDir);
            }
            if !(self.camera_fps > 0.0 && self.camera_fps.is_finite()) {
                return Err(ConfigError::InvalidCameraFps(self.camera_fps));
            }
        }

        self.radio.validate()?;
        Ok(())
    }
}

impl TryFrom<GroundStationArgs> for GroundStationConfig {
    type Error = ConfigError;

    fn try_from(args: GroundStationArgs) -> Result<Self, Self::Error> {
        let config = Self {
            server_name: args.server_name,
            server_addr: SocketAddr::new(args.address, args.port),
            enable_visualization: !args.no_visualization,
            rockets: args.rockets,
            radio: RadioConfig {
                frequency_hz: args.frequency,
                bandwidth_hz: args.bandwidth,
                spreading_factor: args.spreading_factor,
                coding_rate: args.coding_rate,
                preamble_length: args.preamble_len,
                sync_word: args.sync_word,
            },
            radio_source: args.radio,
            replay_file: args.replay_file,
            replay_loop: args.replay_loop,
            packet_period: Duration::from_millis(args.packet_period_ms),
            corrupt_every: args.corrupt_every,
            enable_logging: args.enable_logging,
            log_dir: args.log_dir,
            enable_camera: args.enable_camera,
            camera_dir: args.camera_dir,
            camera_fps: args.camera_fps,
            radio_timeout: Duration::from_millis(args.radio_timeout_ms),
            publish_timeout: Duration::from_millis(args.publish_timeout_ms),
            queue_capacity: args.queue_capacity,
            radio_core: args.radio_core,
            status_interval: Duration::from_secs(args.status_interval_secs),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<GroundStationConfig, ConfigError> {
        let mut argv = vec!["ground_station"];
        argv.extend_from_slice(args);
        GroundStationConfig::try_from(GroundStationArgs::parse_from(argv))
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.rockets, vec!["TOM".to_string()]);
        assert_eq!(config.server_addr.port(), 8765);
        assert_eq!(config.radio.sync_word, 0x34);
        assert!(config.enable_visualization);
        assert!(!config.enable_logging);
        GroundStationConfig::default().validate().unwrap();
    }

    #[test]
    fn repeated_rocket_flag_collects_ids() {
        let config = parse(&["-r", "TOM", "-r", "FORTE", "--sync-word", "18"]).unwrap();
        assert_eq!(config.rockets, vec!["TOM".to_string(), "FORTE".to_string()]);
        assert_eq!(config.radio.sync_word, 18);
    }

    #[test]
    fn duplicate_and_empty_rocket_ids_are_rejected() {
        assert!(matches!(
            parse(&["-r", "TOM", "-r", "TOM"]),
            Err(ConfigError::DuplicateRocket(id)) if id == "TOM"
        ));
        assert!(matches!(parse(&["-r", ""]), Err(ConfigError::InvalidRocketId(_))));
        assert!(matches!(parse(&["-r", "a/b"]), Err(ConfigError::InvalidRocketId(_))));

        let config = GroundStationConfig {
            rockets: vec![],
            ..GroundStationConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoRockets)));
    }

    #[test]
    fn replay_and_camera_need_their_paths() {
        assert!(matches!(parse(&["--radio", "replay"]), Err(ConfigError::MissingReplayFile)));
        assert!(matches!(parse(&["--enable-camera"]), Err(ConfigError::MissingCameraDir)));
        assert!(matches!(parse(&["--queue-capacity", "0"]), Err(ConfigError::ZeroQueueCapacity)));
    }

    #[test]
    fn bad_radio_tuning_is_rejected() {
        assert!(matches!(
            parse(&["--bandwidth", "123"]),
            Err(ConfigError::Radio(RadioError::InvalidConfig(_)))
        ));
    }
}
