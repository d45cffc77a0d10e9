//! schema.rs
//! Protobuf messages exchanged with the flight computer, the visualization clients
//! and the offline log tools.
//!
//! Messages are declared with `prost` derives instead of a build-time `.proto`
//! compile step, so the wire layout lives next to the code that uses it.
//!
//! - `GroundPacket`: what the flight computer sends over LoRa.
//! - `Location`, `SignalQuality`, `CompressedImage`: what the station republishes.
//! - `NavPacket`: full navigation record used by the offline log tools.
//! - `ServerFrame`: length-prefixed framing used by the visualization transport.

use prost::Message;

/// Wall-clock timestamp, wire-compatible with `google.protobuf.Timestamp`.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

impl Timestamp {
    pub fn from_nanos(ns: u64) -> Self {
        Self {
            seconds: (ns / 1_000_000_000) as i64,
            nanos: (ns % 1_000_000_000) as i32,
        }
    }

    /// Builds a timestamp from fractional seconds (OpenRocket exports time this way).
    pub fn from_secs_f64(secs: f64) -> Self {
        let whole = secs.trunc();
        Self {
            seconds: whole as i64,
            nanos: ((secs - whole) * 1e9) as i32,
        }
    }

    /// Nanoseconds since the epoch. Negative parts clamp to zero, overflow saturates.
    pub fn as_nanos(&self) -> u64 {
        (self.seconds.max(0) as u64)
            .saturating_mul(1_000_000_000)
            .saturating_add(self.nanos.max(0) as u64)
    }
}

// ============================================================================
// Radio uplink
// ============================================================================

/// Packet transmitted by a flight computer.
#[derive(Clone, PartialEq, Message)]
pub struct GroundPacket {
    #[prost(string, tag = "1")]
    pub rocket_id: String,
    #[prost(message, optional, tag = "2")]
    pub location: Option<Location>,
    /// Opaque flight-computer telemetry (usually an encoded `NavPacket`).
    #[prost(bytes = "vec", tag = "3")]
    pub telemetry: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct Location {
    #[prost(double, tag = "1")]
    pub latitude: f64,
    #[prost(double, tag = "2")]
    pub longitude: f64,
    #[prost(double, tag = "3")]
    pub altitude: f64,
}

// ============================================================================
// Republished channels
// ============================================================================

#[derive(Clone, Copy, PartialEq, Message)]
pub struct SignalQuality {
    #[prost(float, tag = "1")]
    pub rssi_dbm: f32,
    #[prost(float, tag = "2")]
    pub snr_db: f32,
    #[prost(message, optional, tag = "3")]
    pub timestamp: Option<Timestamp>,
}

/// Same field layout as `foxglove.CompressedImage`.
#[derive(Clone, PartialEq, Message)]
pub struct CompressedImage {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Timestamp>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(string, tag = "3")]
    pub format: String,
    #[prost(string, tag = "4")]
    pub frame_id: String,
}

// ============================================================================
// Navigation record (offline tools)
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct NavPacket {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub gnss: Option<Gnss>,
    #[prost(message, optional, tag = "3")]
    pub imu0: Option<Imu>,
    #[prost(message, optional, tag = "4")]
    pub imu1: Option<Imu>,
    #[prost(message, optional, tag = "5")]
    pub imu2: Option<Imu>,
    #[prost(message, optional, tag = "6")]
    pub alt0: Option<Altimeter>,
    #[prost(message, optional, tag = "7")]
    pub alt1: Option<Altimeter>,
    #[prost(message, optional, tag = "8")]
    pub alt2: Option<Altimeter>,
    #[prost(message, optional, tag = "9")]
    pub magn: Option<Magnetometer>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Gnss {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Timestamp>,
    #[prost(double, tag = "2")]
    pub latitude: f64,
    #[prost(double, tag = "3")]
    pub longitude: f64,
    #[prost(double, tag = "4")]
    pub altitude: f64,
    #[prost(uint32, tag = "5")]
    pub satellites: u32,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct Imu {
    #[prost(float, tag = "1")]
    pub acc_x: f32,
    #[prost(float, tag = "2")]
    pub acc_y: f32,
    #[prost(float, tag = "3")]
    pub acc_z: f32,
    #[prost(float, tag = "4")]
    pub gyr_x: f32,
    #[prost(float, tag = "5")]
    pub gyr_y: f32,
    #[prost(float, tag = "6")]
    pub gyr_z: f32,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct Altimeter {
    #[prost(double, tag = "1")]
    pub altitude: f64,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct Magnetometer {
    #[prost(float, tag = "1")]
    pub x: f32,
    #[prost(float, tag = "2")]
    pub y: f32,
    #[prost(float, tag = "3")]
    pub z: f32,
}

// ============================================================================
// Visualization transport framing
// ============================================================================

/// One frame on the visualization socket.
#[derive(Clone, PartialEq, Message)]
pub struct ServerFrame {
    #[prost(oneof = "server_frame::Kind", tags = "1, 2")]
    pub kind: Option<server_frame::Kind>,
}

pub mod server_frame {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Advertise(super::ChannelAdvertisement),
        #[prost(message, tag = "2")]
        Data(super::MessageData),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelAdvertisement {
    #[prost(uint32, tag = "1")]
    pub channel_id: u32,
    #[prost(string, tag = "2")]
    pub topic: String,
    #[prost(string, tag = "3")]
    pub encoding: String,
    #[prost(string, tag = "4")]
    pub schema_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MessageData {
    #[prost(uint32, tag = "1")]
    pub channel_id: u32,
    #[prost(uint64, tag = "2")]
    pub log_time_ns: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}

/// Fully-qualified schema names advertised to visualization clients.
pub mod names {
    pub const GROUND_PACKET: &str = "groundstation.GroundPacket";
    pub const LOCATION: &str = "groundstation.Location";
    pub const SIGNAL_QUALITY: &str = "groundstation.SignalQuality";
    pub const COMPRESSED_IMAGE: &str = "foxglove.CompressedImage";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_splits_nanoseconds() {
        let ts = Timestamp::from_nanos(1_700_000_000_123_456_789);
        assert_eq!(ts.seconds, 1_700_000_000);
        assert_eq!(ts.nanos, 123_456_789);
        assert_eq!(ts.as_nanos(), 1_700_000_000_123_456_789);
    }

    #[test]
    fn far_future_timestamp_saturates() {
        let ts = Timestamp {
            seconds: i64::MAX,
            nanos: 999_999_999,
        };
        assert_eq!(ts.as_nanos(), u64::MAX);
        let before_epoch = Timestamp {
            seconds: -5,
            nanos: -1,
        };
        assert_eq!(before_epoch.as_nanos(), 0);
    }

    #[test]
    fn timestamp_from_fractional_seconds() {
        let ts = Timestamp::from_secs_f64(12.5);
        assert_eq!(ts.seconds, 12);
        assert_eq!(ts.nanos, 500_000_000);
    }

    #[test]
    fn ground_packet_without_location_stays_none() {
        let pkt = GroundPacket {
            rocket_id: "TOM".into(),
            location: None,
            telemetry: vec![1, 2],
        };
        let decoded = GroundPacket::decode(pkt.encode_to_vec().as_slice()).unwrap();
        assert!(decoded.location.is_none());
        assert_eq!(decoded.telemetry, vec![1, 2]);
    }

    #[test]
    fn server_frame_carries_oneof() {
        let frame = ServerFrame {
            kind: Some(server_frame::Kind::Data(MessageData {
                channel_id: 3,
                log_time_ns: 42,
                payload: vec![9],
            })),
        };
        let back = ServerFrame::decode(frame.encode_to_vec().as_slice()).unwrap();
        match back.kind {
            Some(server_frame::Kind::Data(d)) => assert_eq!(d.channel_id, 3),
            _ => panic!("expected data frame"),
        }
    }
}
