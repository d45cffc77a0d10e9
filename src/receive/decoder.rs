//! decoder.rs
//! Turns raw radio bytes into a `DecodedRecord`.
//!
//! Decoding is pure: a malformed packet comes back as a `DecodeError` value and the
//! caller decides what to do with it. Nothing in here panics on bad input.

use prost::Message;
use thiserror::Error;

use crate::receive::packet::{DecodedRecord, LocationFix, TelemetryPacket};
use crate::schema::GroundPacket;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty packet")]
    Empty,

    #[error("malformed packet: {0}")]
    Malformed(#[from] prost::DecodeError),

    #[error("packet carries no rocket identifier")]
    MissingRocketId,

    #[error("location fix has a non-finite coordinate")]
    NonFiniteLocation,
}

/// Decode a received packet. Signal metrics and receive time are carried over from
/// the packet, the rest comes from the wire.
pub fn decode(packet: &TelemetryPacket) -> Result<DecodedRecord, DecodeError> {
    let wire = decode_ground_packet(&packet.bytes)?;

    let location = match wire.location {
        Some(loc) => {
            if !(loc.latitude.is_finite() && loc.longitude.is_finite() && loc.altitude.is_finite()) {
                return Err(DecodeError::NonFiniteLocation);
            }
            Some(LocationFix {
                latitude: loc.latitude,
                longitude: loc.longitude,
                altitude: loc.altitude,
            })
        }
        None => None,
    };

    Ok(DecodedRecord {
        rocket_id: wire.rocket_id,
        location,
        telemetry: wire.telemetry,
        signal: packet.signal,
        received_ns: packet.received_ns,
    })
}

/// Parse and minimally validate the wire message.
pub fn decode_ground_packet(bytes: &[u8]) -> Result<GroundPacket, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let wire = GroundPacket::decode(bytes)?;
    if wire.rocket_id.trim().is_empty() {
        return Err(DecodeError::MissingRocketId);
    }
    Ok(wire)
}
