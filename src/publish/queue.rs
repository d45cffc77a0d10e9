//! queue.rs
//! Bounded FIFO between a producer (radio or camera reader) and one channel publisher.
//!
//! The producer never blocks: when the queue is full the oldest queued message is
//! discarded to make room (drop-oldest). Stale visualization data is the price of
//! keeping radio reads on time.

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Opaque payload awaiting publication.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Nanoseconds since the Unix epoch.
    pub log_time_ns: u64,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn new(log_time_ns: u64, payload: Vec<u8>) -> Self {
        Self {
            log_time_ns,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// Enqueued after discarding the oldest queued message.
    DisplacedOldest,
}

/// Write end. Holds a receiver clone so it can evict the oldest entry itself.
#[derive(Clone)]
pub struct QueueProducer {
    name: Arc<str>,
    tx: Sender<OutboundMessage>,
    evict: Receiver<OutboundMessage>,
    displaced: Arc<AtomicU64>,
}

/// Read end, owned by exactly one publisher.
pub struct QueueConsumer {
    name: Arc<str>,
    rx: Receiver<OutboundMessage>,
    displaced: Arc<AtomicU64>,
}

/// Create a drop-oldest queue holding at most `capacity` messages.
pub fn output_queue(name: &str, capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = bounded(capacity.max(1));
    let name: Arc<str> = Arc::from(name);
    let displaced = Arc::new(AtomicU64::new(0));
    (
        QueueProducer {
            name: name.clone(),
            tx,
            evict: rx.clone(),
            displaced: displaced.clone(),
        },
        QueueConsumer {
            name,
            rx,
            displaced,
        },
    )
}

impl QueueProducer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&self, msg: OutboundMessage) -> PushOutcome {
        let mut msg = msg;
        let mut outcome = PushOutcome::Enqueued;
        loop {
            match self.tx.try_send(msg) {
                Ok(()) => return outcome,
                Err(TrySendError::Full(back)) => {
                    // The publisher may have drained the slot in between; either way retry.
                    if self.evict.try_recv().is_ok() {
                        self.displaced.fetch_add(1, Ordering::Relaxed);
                        outcome = PushOutcome::DisplacedOldest;
                    }
                    msg = back;
                }
                // Unreachable while `evict` is alive.
                Err(TrySendError::Disconnected(_)) => {
                    self.displaced.fetch_add(1, Ordering::Relaxed);
                    return PushOutcome::DisplacedOldest;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    pub fn displaced(&self) -> u64 {
        self.displaced.load(Ordering::Relaxed)
    }
}

impl QueueConsumer {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block for at most `timeout` waiting for the next message.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<OutboundMessage, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_pop(&self) -> Option<OutboundMessage> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn displaced(&self) -> u64 {
        self.displaced.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: u64) -> OutboundMessage {
        OutboundMessage::new(n, vec![n as u8])
    }

    #[test]
    fn preserves_fifo_order() {
        let (p, c) = output_queue("t", 8);
        for i in 0..5 {
            assert_eq!(p.push(msg(i)), PushOutcome::Enqueued);
        }
        let drained: Vec<u64> = std::iter::from_fn(|| c.try_pop()).map(|m| m.log_time_ns).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overflow_drops_oldest_and_keeps_newest_in_order() {
        let (p, c) = output_queue("t", 3);
        for i in 0..3 {
            p.push(msg(i));
        }
        assert_eq!(p.push(msg(3)), PushOutcome::DisplacedOldest);
        assert_eq!(p.push(msg(4)), PushOutcome::DisplacedOldest);

        assert_eq!(p.displaced(), 2);
        assert_eq!(c.len(), 3);
        let drained: Vec<u64> = std::iter::from_fn(|| c.try_pop()).map(|m| m.log_time_ns).collect();
        assert_eq!(drained, vec![2, 3, 4]);
    }

    #[test]
    fn pop_timeout_on_empty_queue_times_out() {
        let (_p, c) = output_queue("t", 1);
        assert_eq!(
            c.pop_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
    }
}
