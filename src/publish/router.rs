//! router.rs
//! Rocket Router: decoded record → per-rocket channels → output queues.
//!
//! The routing table is built once at start-up from the configured rocket ids and
//! never changes afterwards, so lookups need no locking. Unknown ids and records
//! with an implausible altitude are dropped and counted, never treated as errors.

use std::{collections::HashMap, sync::Arc};

use log::debug;
use prost::Message;

use crate::publish::queue::{OutboundMessage, PushOutcome, QueueProducer};
use crate::receive::packet::{DecodedRecord, TelemetryPacket};
use crate::schema::{self, Location, SignalQuality, Timestamp};
use crate::utils::metrics::StationMetrics;

/// Altitude magnitude above which a record is considered corrupt.
pub const ALTITUDE_SANITY_LIMIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Telemetry,
    Location,
    Signal,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [ChannelKind::Telemetry, ChannelKind::Location, ChannelKind::Signal];

    pub fn suffix(self) -> &'static str {
        match self {
            ChannelKind::Telemetry => "telemetry",
            ChannelKind::Location => "location",
            ChannelKind::Signal => "signal",
        }
    }

    pub fn schema_name(self) -> &'static str {
        match self {
            ChannelKind::Telemetry => schema::names::GROUND_PACKET,
            ChannelKind::Location => schema::names::LOCATION,
            ChannelKind::Signal => schema::names::SIGNAL_QUALITY,
        }
    }

    /// "/TOM/location"
    pub fn topic_for(self, rocket_id: &str) -> String {
        format!("/{}/{}", rocket_id, self.suffix())
    }
}

/// One logical channel: the queues of every sink subscribed to a topic.
#[derive(Clone)]
pub struct ChannelFanout {
    topic: String,
    queues: Vec<QueueProducer>,
}

impl ChannelFanout {
    pub fn new(topic: impl Into<String>, queues: Vec<QueueProducer>) -> Self {
        Self {
            topic: topic.into(),
            queues,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn queues(&self) -> &[QueueProducer] {
        &self.queues
    }

    /// Push a copy onto every sink queue. Never blocks.
    /// Returns how many queued messages were displaced to make room.
    pub fn enqueue(&self, msg: OutboundMessage) -> u64 {
        let Some((last, rest)) = self.queues.split_last() else {
            return 0;
        };
        let mut displaced = 0;
        for queue in rest {
            if queue.push(msg.clone()) == PushOutcome::DisplacedOldest {
                displaced += 1;
            }
        }
        if last.push(msg) == PushOutcome::DisplacedOldest {
            displaced += 1;
        }
        displaced
    }
}

/// Output channels of one configured rocket.
#[derive(Clone)]
pub struct RocketChannelSet {
    pub telemetry: ChannelFanout,
    pub location: ChannelFanout,
    pub signal: ChannelFanout,
}

impl RocketChannelSet {
    pub fn channel(&self, kind: ChannelKind) -> &ChannelFanout {
        match kind {
            ChannelKind::Telemetry => &self.telemetry,
            ChannelKind::Location => &self.location,
            ChannelKind::Signal => &self.signal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Enqueued on `channels` channels of the rocket.
    Routed { channels: usize },
    UnknownRocket,
    AltitudeOutOfRange,
}

#[derive(Clone)]
pub struct RocketRouter {
    table: Arc<HashMap<String, RocketChannelSet>>,
    metrics: Arc<StationMetrics>,
}

impl RocketRouter {
    pub fn new(table: HashMap<String, RocketChannelSet>, metrics: Arc<StationMetrics>) -> Self {
        Self {
            table: Arc::new(table),
            metrics,
        }
    }

    pub fn rockets(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn channels(&self, rocket_id: &str) -> Option<&RocketChannelSet> {
        self.table.get(rocket_id)
    }

    /// Fan a decoded record out to its rocket's channels.
    ///
    /// The telemetry channel always carries the raw packet bytes; location and
    /// signal are only emitted when the record has them.
    pub fn route(&self, packet: &TelemetryPacket, record: &DecodedRecord) -> RouteOutcome {
        let Some(set) = self.table.get(&record.rocket_id) else {
            self.metrics.record_unknown_rocket();
            debug!("[Router] dropped packet for unknown rocket {:?}", record.rocket_id);
            return RouteOutcome::UnknownRocket;
        };

        if let Some(fix) = &record.location {
            if fix.altitude.abs() > ALTITUDE_SANITY_LIMIT {
                self.metrics.record_altitude_rejected();
                debug!(
                    "[Router] dropped {} record, altitude {} out of range",
                    record.rocket_id, fix.altitude
                );
                return RouteOutcome::AltitudeOutOfRange;
            }
        }

        let log_time_ns = record.received_ns;
        let mut channels = 0;
        let mut displaced = 0;

        if let Some(fix) = &record.location {
            let payload = Location {
                latitude: fix.latitude,
                longitude: fix.longitude,
                altitude: fix.altitude,
            }
            .encode_to_vec();
            displaced += set.location.enqueue(OutboundMessage::new(log_time_ns, payload));
            channels += 1;
        }

        displaced += set
            .telemetry
            .enqueue(OutboundMessage::new(log_time_ns, packet.bytes.clone()));
        channels += 1;

        if let Some(signal) = &record.signal {
            let payload = SignalQuality {
                rssi_dbm: signal.rssi_dbm,
                snr_db: signal.snr_db,
                timestamp: Some(Timestamp::from_nanos(log_time_ns)),
            }
            .encode_to_vec();
            displaced += set.signal.enqueue(OutboundMessage::new(log_time_ns, payload));
            channels += 1;
        }

        self.metrics.record_queue_overflow(displaced);
        self.metrics.record_routed(&record.rocket_id);
        RouteOutcome::Routed { channels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::queue::{QueueConsumer, output_queue};
    use crate::receive::packet::{LocationFix, SignalMetrics};

    struct Queues {
        telemetry: QueueConsumer,
        location: QueueConsumer,
        signal: QueueConsumer,
    }

    fn router_for(rocket: &str) -> (RocketRouter, Queues, Arc<StationMetrics>) {
        let (tp, tc) = output_queue("t", 4);
        let (lp, lc) = output_queue("l", 4);
        let (sp, sc) = output_queue("s", 4);
        let set = RocketChannelSet {
            telemetry: ChannelFanout::new(ChannelKind::Telemetry.topic_for(rocket), vec![tp]),
            location: ChannelFanout::new(ChannelKind::Location.topic_for(rocket), vec![lp]),
            signal: ChannelFanout::new(ChannelKind::Signal.topic_for(rocket), vec![sp]),
        };
        let metrics = Arc::new(StationMetrics::default());
        let router = RocketRouter::new(HashMap::from([(rocket.to_string(), set)]), metrics.clone());
        (
            router,
            Queues {
                telemetry: tc,
                location: lc,
                signal: sc,
            },
            metrics,
        )
    }

    fn record(rocket: &str, location: Option<LocationFix>, signal: Option<SignalMetrics>) -> DecodedRecord {
        DecodedRecord {
            rocket_id: rocket.into(),
            location,
            telemetry: vec![],
            signal,
            received_ns: 42,
        }
    }

    #[test]
    fn topics_are_scoped_by_rocket() {
        assert_eq!(ChannelKind::Location.topic_for("TOM"), "/TOM/location");
        assert_eq!(ChannelKind::Signal.schema_name(), schema::names::SIGNAL_QUALITY);
    }

    #[test]
    fn fanout_copies_to_every_sink_queue() {
        let (a, ac) = output_queue("a", 2);
        let (b, bc) = output_queue("b", 2);
        let fanout = ChannelFanout::new("/x", vec![a, b]);
        assert_eq!(fanout.enqueue(OutboundMessage::new(1, vec![9])), 0);
        assert_eq!(ac.try_pop().unwrap().payload, vec![9]);
        assert_eq!(bc.try_pop().unwrap().payload, vec![9]);
    }

    #[test]
    fn record_without_optional_fields_only_hits_telemetry() {
        let (router, q, metrics) = router_for("TOM");
        let packet = TelemetryPacket::new(vec![7, 7], 42, None);

        let outcome = router.route(&packet, &record("TOM", None, None));

        assert_eq!(outcome, RouteOutcome::Routed { channels: 1 });
        assert_eq!(q.telemetry.try_pop().unwrap().payload, vec![7, 7]);
        assert!(q.location.is_empty());
        assert!(q.signal.is_empty());
        assert_eq!(metrics.snapshot().per_rocket, vec![("TOM".to_string(), 1)]);
    }

    #[test]
    fn altitude_exactly_at_limit_is_accepted() {
        let (router, q, _) = router_for("TOM");
        let fix = LocationFix {
            latitude: 0.0,
            longitude: 0.0,
            altitude: -ALTITUDE_SANITY_LIMIT,
        };
        let packet = TelemetryPacket::new(vec![1], 42, None);
        assert_eq!(
            router.route(&packet, &record("TOM", Some(fix), None)),
            RouteOutcome::Routed { channels: 2 }
        );
        let loc = Location::decode(q.location.try_pop().unwrap().payload.as_slice()).unwrap();
        assert_eq!(loc.altitude, -ALTITUDE_SANITY_LIMIT);
    }

    #[test]
    fn signal_payload_carries_receive_time() {
        let (router, q, _) = router_for("TOM");
        let signal = SignalMetrics {
            rssi_dbm: -91.5,
            snr_db: 3.25,
        };
        let packet = TelemetryPacket::new(vec![1], 42, Some(signal));
        router.route(&packet, &record("TOM", None, Some(signal)));

        let msg = q.signal.try_pop().unwrap();
        let quality = SignalQuality::decode(msg.payload.as_slice()).unwrap();
        assert_eq!(msg.log_time_ns, 42);
        assert_eq!(quality.rssi_dbm, -91.5);
        assert_eq!(quality.snr_db, 3.25);
        assert_eq!(quality.timestamp.unwrap().as_nanos(), 42);
    }
}
