//! metrics.rs
//! Station-wide counters, shared by every worker through `Arc<StationMetrics>`.
//!
//! All counters are plain atomics (Relaxed): they are only ever read for status
//! lines and the shutdown summary, never used for synchronization.
//! Per-rocket routed counts live in a `DashMap` keyed by rocket id.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

#[derive(Default)]
pub struct StationMetrics {
    packets_received: AtomicU64,
    decode_errors: AtomicU64,
    radio_errors: AtomicU64,
    routed: AtomicU64,
    unknown_rocket: AtomicU64,
    altitude_rejected: AtomicU64,
    queue_overflow: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
    camera_frames: AtomicU64,
    camera_errors: AtomicU64,
    per_rocket: DashMap<String, AtomicU64>,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub decode_errors: u64,
    pub radio_errors: u64,
    pub routed: u64,
    pub unknown_rocket: u64,
    pub altitude_rejected: u64,
    pub queue_overflow: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub camera_frames: u64,
    pub camera_errors: u64,
    /// (rocket id, routed records), sorted by id.
    #[serde(skip)]
    pub per_rocket: Vec<(String, u64)>,
}

impl StationMetrics {
    #[inline]
    pub fn record_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_radio_error(&self) {
        self.radio_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// One record fanned out for `rocket_id`.
    pub fn record_routed(&self, rocket_id: &str) {
        self.routed.fetch_add(1, Ordering::Relaxed);
        // Fast path: the entry exists after the first packet of each rocket.
        if let Some(counter) = self.per_rocket.get(rocket_id) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.per_rocket
            .entry(rocket_id.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unknown_rocket(&self) {
        self.unknown_rocket.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_altitude_rejected(&self) {
        self.altitude_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages discarded by drop-oldest queues.
    #[inline]
    pub fn record_queue_overflow(&self, displaced: u64) {
        if displaced > 0 {
            self.queue_overflow.fetch_add(displaced, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_camera_frame(&self) {
        self.camera_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_camera_error(&self) {
        self.camera_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut per_rocket: Vec<(String, u64)> = self
            .per_rocket
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        per_rocket.sort();

        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            radio_errors: self.radio_errors.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            unknown_rocket: self.unknown_rocket.load(Ordering::Relaxed),
            altitude_rejected: self.altitude_rejected.load(Ordering::Relaxed),
            queue_overflow: self.queue_overflow.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            camera_frames: self.camera_frames.load(Ordering::Relaxed),
            camera_errors: self.camera_errors.load(Ordering::Relaxed),
            per_rocket,
        }
    }
}

impl MetricsSnapshot {
    /// Flattened `(metric, value)` pairs, the layout of the summary CSV.
    pub fn rows(&self) -> Vec<(String, u64)> {
        let mut rows = vec![
            ("packets_received".to_string(), self.packets_received),
            ("decode_errors".to_string(), self.decode_errors),
            ("radio_errors".to_string(), self.radio_errors),
            ("routed".to_string(), self.routed),
            ("unknown_rocket".to_string(), self.unknown_rocket),
            ("altitude_rejected".to_string(), self.altitude_rejected),
            ("queue_overflow".to_string(), self.queue_overflow),
            ("published".to_string(), self.published),
            ("publish_failures".to_string(), self.publish_failures),
            ("camera_frames".to_string(), self.camera_frames),
            ("camera_errors".to_string(), self.camera_errors),
        ];
        rows.extend(
            self.per_rocket
                .iter()
                .map(|(id, n)| (format!("routed.{}", id), *n)),
        );
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn per_rocket_counts_survive_concurrent_updates() {
        let metrics = Arc::new(StationMetrics::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        m.record_routed("TOM");
                        m.record_routed("FORTE");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.routed, 2000);
        assert_eq!(
            snap.per_rocket,
            vec![("FORTE".to_string(), 1000), ("TOM".to_string(), 1000)]
        );
    }

    #[test]
    fn rows_include_per_rocket_entries() {
        let metrics = StationMetrics::default();
        metrics.record_routed("TOM");
        metrics.record_queue_overflow(0);
        metrics.record_queue_overflow(3);

        let rows = metrics.snapshot().rows();
        assert!(rows.contains(&("queue_overflow".to_string(), 3)));
        assert!(rows.contains(&("routed.TOM".to_string(), 1)));
    }
}
