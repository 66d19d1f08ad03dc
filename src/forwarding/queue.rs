use crate::status::RelayStatus;
use crate::transport::InboundMessage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardPayload {
    /// Forward the original message natively, attachment included.
    MediaOnly,
    /// Send the processed text as a new message.
    Text(String),
}

/// One accepted inbound message on its way to the target groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub message: InboundMessage,
    pub payload: ForwardPayload,
}

impl WorkItem {
    pub fn media_only(message: InboundMessage) -> Self {
        Self {
            message,
            payload: ForwardPayload::MediaOnly,
        }
    }

    pub fn text(message: InboundMessage, processed_text: String) -> Self {
        Self {
            message,
            payload: ForwardPayload::Text(processed_text),
        }
    }

    pub fn is_media_only(&self) -> bool {
        matches!(self.payload, ForwardPayload::MediaOnly)
    }

    pub fn processed_text(&self) -> Option<&str> {
        match &self.payload {
            ForwardPayload::Text(text) => Some(text.as_str()),
            ForwardPayload::MediaOnly => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("forwarding queue is closed")]
pub struct QueueClosed(pub WorkItem);

/// Creates an unbounded FIFO queue with one producer and one consumer.
///
/// The pending item count is mirrored into `status.queue_depth`.
pub fn forwarding_queue(status: Arc<RelayStatus>) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        QueueProducer {
            tx,
            status: status.clone(),
        },
        QueueConsumer { rx, status },
    )
}

pub struct QueueProducer {
    tx: mpsc::UnboundedSender<WorkItem>,
    status: Arc<RelayStatus>,
}

impl QueueProducer {
    pub fn enqueue(&self, item: WorkItem) -> Result<(), QueueClosed> {
        self.tx.send(item).map_err(|e| QueueClosed(e.0))?;
        RelayStatus::incr(&self.status.queue_depth);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<WorkItem>,
    status: Arc<RelayStatus>,
}

impl QueueConsumer {
    /// Waits for the next item; `None` once the producer is gone and the
    /// queue is drained.
    pub async fn next(&mut self) -> Option<WorkItem> {
        let item = self.rx.recv().await?;
        RelayStatus::decr(&self.status.queue_depth);
        Some(item)
    }
}
