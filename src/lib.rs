//! # ground_station
//! LoRa rocket ground station core.
//!
//! Radio Reader → decode → route → drop-oldest queues → Channel Publishers → sinks
//! (live visualization server and/or per-channel CSV logs). An optional camera
//! reader feeds its own image channel in parallel.
//!
//! - `receive`: radio interface, decoder, radio and camera readers
//! - `publish`: router, queues, publishers, sinks and the visualization transport
//! - `station`: start-up ordering and orderly shutdown
//! - `schema`: protobuf messages
//! - `utils`: configuration, metrics, CSV export, pacing, signal handling

pub mod publish;
pub mod receive;
pub mod schema;
pub mod station;
pub mod utils;
