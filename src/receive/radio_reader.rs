//! radio_reader.rs
//! Radio Reader: the only thread that touches the radio.
//!
//! POLLING → DECODING → ROUTED/DROPPED → POLLING, until the running flag clears.
//! - decode failures are logged, counted and skipped
//! - routing only enqueues; publishing happens on the publisher threads
//! - radio errors never stop the loop; a run of them triggers a short backoff

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::publish::router::{RocketRouter, RouteOutcome};
use crate::receive::{
    decoder::{DecodeError, decode},
    packet::{SignalMetrics, TelemetryPacket, unix_now_ns},
    radio::{Radio, RadioError},
};
use crate::utils::metrics::StationMetrics;

pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);
/// Consecutive radio errors before the reader pauses for one receive timeout.
pub const ERROR_BACKOFF_THRESHOLD: u32 = 5;

/// What one iteration of the reader loop did.
#[derive(Debug)]
pub enum ReaderStep {
    Idle,
    Routed(RouteOutcome),
    Corrupt(DecodeError),
    RadioFault(RadioError),
}

pub struct RadioReader<R: Radio> {
    radio: R,
    router: RocketRouter,
    running: Arc<AtomicBool>,
    metrics: Arc<StationMetrics>,
    receive_timeout: Duration,
    core: Option<usize>,
    consecutive_errors: u32,
}

impl<R: Radio> RadioReader<R> {
    pub fn new(
        radio: R,
        router: RocketRouter,
        running: Arc<AtomicBool>,
        metrics: Arc<StationMetrics>,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            radio,
            router,
            running,
            metrics,
            receive_timeout,
            core: None,
            consecutive_errors: 0,
        }
    }

    /// Pin the reader thread to this CPU core when `run` starts.
    pub fn pinned_to(mut self, core: Option<usize>) -> Self {
        self.core = core;
        self
    }

    /// Loop until shutdown. Returns the radio so the caller can release it.
    pub fn run(mut self) -> R {
        if let Some(core) = self.core {
            pin_current_thread(core);
        }
        info!(
            "[RadioReader] started, rockets: {:?}",
            self.router.rockets().collect::<Vec<_>>()
        );

        while self.running.load(Ordering::Acquire) {
            match self.poll_once() {
                ReaderStep::Idle | ReaderStep::Routed(_) => {}
                ReaderStep::Corrupt(e) => warn!("[RadioReader] dropped corrupt packet: {}", e),
                ReaderStep::RadioFault(e) => {
                    error!("[RadioReader] receive failed: {}", e);
                    if self.consecutive_errors >= ERROR_BACKOFF_THRESHOLD {
                        warn!(
                            "[RadioReader] {} consecutive radio errors, backing off",
                            self.consecutive_errors
                        );
                        thread::sleep(self.receive_timeout);
                        self.consecutive_errors = 0;
                    }
                }
            }
        }

        info!("[RadioReader] stopped.");
        self.radio
    }

    /// One receive → decode → route cycle.
    pub fn poll_once(&mut self) -> ReaderStep {
        let bytes = match self.radio.receive(self.receive_timeout) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return ReaderStep::Idle,
            Err(e) => {
                self.consecutive_errors += 1;
                self.metrics.record_radio_error();
                return ReaderStep::RadioFault(e);
            }
        };
        self.consecutive_errors = 0;

        let packet = TelemetryPacket::new(bytes, unix_now_ns(), self.last_signal());
        self.metrics.record_received();

        match decode(&packet) {
            Ok(record) => {
                let outcome = self.router.route(&packet, &record);
                debug!("[RadioReader] {} -> {:?}", record.rocket_id, outcome);
                ReaderStep::Routed(outcome)
            }
            Err(e) => {
                self.metrics.record_decode_error();
                ReaderStep::Corrupt(e)
            }
        }
    }

    fn last_signal(&self) -> Option<SignalMetrics> {
        match (self.radio.last_rssi(), self.radio.last_snr()) {
            (Some(rssi_dbm), Some(snr_db)) => Some(SignalMetrics { rssi_dbm, snr_db }),
            _ => None,
        }
    }
}

fn pin_current_thread(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(core_id) if core_affinity::set_for_current(*core_id) => {
            info!("[RadioReader] pinned to core {}", core)
        }
        Some(_) => error!("[RadioReader] failed to pin to core {}", core),
        None => error!("[RadioReader] core {} not among available cores", core),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{
        queue::output_queue,
        router::{ChannelFanout, RocketChannelSet},
    };
    use crate::receive::radio::RadioConfig;
    use crate::schema::GroundPacket;
    use prost::Message;
    use std::collections::{HashMap, VecDeque};

    /// Scripted radio: each receive pops the next scripted result.
    struct ScriptedRadio {
        script: VecDeque<Result<Option<Vec<u8>>, RadioError>>,
        receives: usize,
    }

    impl Radio for ScriptedRadio {
        fn configure(&mut self, _: &RadioConfig) -> Result<(), RadioError> {
            Ok(())
        }

        fn receive(&mut self, _: Duration) -> Result<Option<Vec<u8>>, RadioError> {
            self.receives += 1;
            self.script.pop_front().unwrap_or(Ok(None))
        }

        fn last_rssi(&self) -> Option<f32> {
            Some(-70.0)
        }

        fn last_snr(&self) -> Option<f32> {
            Some(9.0)
        }
    }

    fn reader(script: Vec<Result<Option<Vec<u8>>, RadioError>>) -> (RadioReader<ScriptedRadio>, Arc<StationMetrics>) {
        let (tp, _tc) = output_queue("t", 8);
        let (lp, _lc) = output_queue("l", 8);
        let (sp, _sc) = output_queue("s", 8);
        let set = RocketChannelSet {
            telemetry: ChannelFanout::new("/TOM/telemetry", vec![tp]),
            location: ChannelFanout::new("/TOM/location", vec![lp]),
            signal: ChannelFanout::new("/TOM/signal", vec![sp]),
        };
        let metrics = Arc::new(StationMetrics::default());
        let router = RocketRouter::new(HashMap::from([("TOM".to_string(), set)]), metrics.clone());
        let radio = ScriptedRadio {
            script: script.into(),
            receives: 0,
        };
        (
            RadioReader::new(
                radio,
                router,
                Arc::new(AtomicBool::new(true)),
                metrics.clone(),
                Duration::from_millis(1),
            ),
            metrics,
        )
    }

    fn tom_packet() -> Vec<u8> {
        GroundPacket {
            rocket_id: "TOM".into(),
            location: None,
            telemetry: vec![1],
        }
        .encode_to_vec()
    }

    #[test]
    fn corrupt_packet_is_counted_and_next_receive_still_happens() {
        let (mut reader, metrics) = reader(vec![Ok(Some(vec![0xFF, 0xFF])), Ok(Some(tom_packet()))]);

        assert!(matches!(reader.poll_once(), ReaderStep::Corrupt(_)));
        assert!(matches!(
            reader.poll_once(),
            ReaderStep::Routed(RouteOutcome::Routed { channels: 2 })
        ));
        assert_eq!(reader.radio.receives, 2);

        let snap = metrics.snapshot();
        assert_eq!(snap.packets_received, 2);
        assert_eq!(snap.decode_errors, 1);
        assert_eq!(snap.routed, 1);
    }

    #[test]
    fn radio_errors_reset_after_a_good_packet() {
        let (mut reader, metrics) = reader(vec![
            Err(RadioError::Hardware("crc".into())),
            Err(RadioError::Hardware("crc".into())),
            Ok(Some(tom_packet())),
        ]);
        reader.poll_once();
        reader.poll_once();
        assert_eq!(reader.consecutive_errors, 2);
        reader.poll_once();
        assert_eq!(reader.consecutive_errors, 0);
        assert_eq!(metrics.snapshot().radio_errors, 2);
    }

    #[test]
    fn idle_poll_touches_nothing() {
        let (mut reader, metrics) = reader(vec![]);
        assert!(matches!(reader.poll_once(), ReaderStep::Idle));
        assert_eq!(metrics.snapshot(), Default::default());
    }
}
