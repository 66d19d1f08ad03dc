//! Outbound half of the relay: the work queue and its single consumer.

pub mod queue;
pub mod worker;

pub use queue::{forwarding_queue, ForwardPayload, QueueClosed, QueueConsumer, QueueProducer, WorkItem};
pub use worker::ForwardingWorker;
