pub mod config;
pub mod export;
pub mod metrics;
pub mod openrocket;
pub mod pacing;
pub mod signal;
