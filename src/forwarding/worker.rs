use super::queue::{ForwardPayload, QueueConsumer, WorkItem};
use crate::config::{limits, TopicBinding};
use crate::config_store::ConfigStore;
use crate::status::RelayStatus;
use crate::transport::{Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{ChatId, MessageId};
use tokio::time::sleep;

/// Single consumer of the forwarding queue.
///
/// Items are handled strictly one at a time: every target group gets its
/// send attempts (bounded by `max_retries`) before the next item is taken.
/// A target that exhausts its retries is skipped for that item only.
pub struct ForwardingWorker {
    transport: Arc<dyn Transport>,
    store: Arc<ConfigStore>,
    status: Arc<RelayStatus>,
}

impl ForwardingWorker {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<ConfigStore>, status: Arc<RelayStatus>) -> Self {
        Self {
            transport,
            store,
            status,
        }
    }

    /// Drains `queue` until its producer is dropped.
    pub async fn run(self, mut queue: QueueConsumer) {
        log::info!("Forwarding worker started");
        while let Some(item) = queue.next().await {
            self.forward(&item).await;

            let delay = self.store.read().settings.forward_delay;
            if let Some(pause) = forward_pause(delay) {
                sleep(pause).await;
            }
        }
        log::info!("Forwarding queue closed, worker stopped");
    }

    /// Sends one item to every configured target group, in order.
    ///
    /// Returns the number of targets that accepted the item.
    pub async fn forward(&self, item: &WorkItem) -> usize {
        let (targets, max_retries) = {
            let config = self.store.read();
            let targets: Vec<(i64, Option<TopicBinding>)> = config
                .target_groups
                .iter()
                .map(|id| (*id, config.topic_for(*id).cloned()))
                .collect();
            (targets, config.settings.max_retries)
        };

        let mut delivered = 0;
        for (target, topic) in targets {
            if self.send_with_retry(item, ChatId(target), topic.as_ref(), max_retries).await {
                delivered += 1;
            }
        }

        if item.is_media_only() && delivered > 0 {
            RelayStatus::incr(&self.status.media_forwarded);
        }
        delivered
    }

    async fn send_with_retry(
        &self,
        item: &WorkItem,
        target: ChatId,
        topic: Option<&TopicBinding>,
        max_retries: u32,
    ) -> bool {
        let mut retries = 0;
        while retries < max_retries {
            match self.deliver(item, target, topic).await {
                Ok(()) => {
                    match topic {
                        Some(topic) => log::info!(
                            "Message {} sent to {} topic {} ({})",
                            item.message.id,
                            target,
                            topic.topic_id,
                            topic.topic_name.as_deref().unwrap_or("Unknown")
                        ),
                        None => log::info!("Message {} sent to {}", item.message.id, target),
                    }
                    RelayStatus::incr(&self.status.sends_succeeded);
                    return true;
                }
                Err(TransportError::FloodWait(wait)) => {
                    log::warn!(
                        "Flood wait while sending message {} to {}: sleeping for {:?}",
                        item.message.id,
                        target,
                        wait
                    );
                    retries += 1;
                    sleep(wait).await;
                }
                Err(e) => {
                    log::error!(
                        "Error forwarding message {} from {} to group {}: {}",
                        item.message.id,
                        item.message.chat_id,
                        target,
                        e
                    );
                    retries += 1;
                    if retries < max_retries {
                        sleep(Duration::from_secs(1u64 << retries.min(16))).await;
                    }
                }
            }
        }

        log::error!(
            "Giving up on message {} for group {} after {} attempts",
            item.message.id,
            target,
            max_retries
        );
        RelayStatus::incr(&self.status.sends_failed);
        false
    }

    async fn deliver(
        &self,
        item: &WorkItem,
        target: ChatId,
        topic: Option<&TopicBinding>,
    ) -> Result<(), TransportError> {
        let reply_to = topic.map(|t| MessageId(t.topic_id));
        match &item.payload {
            ForwardPayload::MediaOnly => self.transport.forward(target, &item.message, reply_to).await,
            ForwardPayload::Text(text) => self.transport.send(target, text, reply_to).await,
        }
    }
}

/// Pause after each item. Non-positive or NaN delays mean no pause; anything
/// above the limit is clamped to it.
fn forward_pause(delay: f64) -> Option<Duration> {
    if !(delay > 0.0) {
        return None;
    }
    if delay > limits::MAX_FORWARD_DELAY_SECS {
        log::warn!(
            "Forward delay {}s is above the {}s limit, clamping",
            delay,
            limits::MAX_FORWARD_DELAY_SECS
        );
    }
    Duration::try_from_secs_f64(delay.min(limits::MAX_FORWARD_DELAY_SECS)).ok()
}
