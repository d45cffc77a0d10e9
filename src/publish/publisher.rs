//! publisher.rs
//! Channel Publisher: one worker per output queue, forwarding to exactly one sink.
//! - bounded wait on the queue so the running flag is re-checked at least once per poll
//! - sink failures are logged and counted; the item is lost and draining continues
//! - on shutdown, whatever is already queued is drained before the sink is flushed

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crossbeam::channel::RecvTimeoutError;
use log::{debug, info, warn};

use crate::publish::{
    queue::{OutboundMessage, QueueConsumer},
    sink::Sink,
};
use crate::utils::metrics::StationMetrics;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub struct ChannelPublisher<S: Sink> {
    queue: QueueConsumer,
    sink: S,
    running: Arc<AtomicBool>,
    poll_timeout: Duration,
    metrics: Arc<StationMetrics>,
    published: u64,
    failures: u64,
}

impl<S: Sink> ChannelPublisher<S> {
    pub fn new(
        queue: QueueConsumer,
        sink: S,
        running: Arc<AtomicBool>,
        poll_timeout: Duration,
        metrics: Arc<StationMetrics>,
    ) -> Self {
        Self {
            queue,
            sink,
            running,
            poll_timeout,
            metrics,
            published: 0,
            failures: 0,
        }
    }

    /// Drain until the running flag clears. Hands the sink back to the caller.
    pub fn run(mut self) -> S {
        let label = format!("[Publisher:{}]", self.queue.name());
        info!("{} started -> {}", label, self.sink.describe());

        while self.running.load(Ordering::Acquire) {
            match self.queue.pop_timeout(self.poll_timeout) {
                Ok(msg) => self.forward(&label, &msg),
                Err(RecvTimeoutError::Timeout) => continue,
                // Every producer is gone: nothing more can arrive.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut drained = 0usize;
        while let Some(msg) = self.queue.try_pop() {
            self.forward(&label, &msg);
            drained += 1;
        }
        if let Err(e) = self.sink.flush() {
            warn!("{} flush failed: {}", label, e);
        }

        info!(
            "{} stopped. published={} failed={} drained_at_shutdown={} displaced={}",
            label,
            self.published,
            self.failures,
            drained,
            self.queue.displaced()
        );
        self.sink
    }

    fn forward(&mut self, label: &str, msg: &OutboundMessage) {
        match self.sink.publish(msg) {
            Ok(()) => {
                self.published += 1;
                self.metrics.record_published();
            }
            Err(e) => {
                self.failures += 1;
                self.metrics.record_publish_failure();
                // First failure at warn, the rest at debug so a dead sink cannot flood the log.
                if self.failures == 1 {
                    warn!("{} publish failed: {}", label, e);
                } else {
                    debug!("{} publish failed ({} so far): {}", label, self.failures, e);
                }
            }
        }
    }
}
