// Publish side: routing, bounded drop-oldest queues, one publisher thread per
// (channel, sink) pair, and the sinks themselves (visualization server, CSV log).

pub mod publisher;
pub mod queue;
pub mod router;
pub mod sink;
pub mod transport;
