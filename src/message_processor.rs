use crate::config_store::ConfigStore;
use crate::filters::KeywordFilter;
use crate::status::RelayStatus;
use crate::text_replacer::TextReplacer;
use crate::transport::InboundMessage;
use std::sync::Arc;

/// Turns an inbound message into the text that gets forwarded, or `None`
/// when the message is dropped.
pub struct MessageProcessor {
    store: Arc<ConfigStore>,
    status: Arc<RelayStatus>,
    filter: KeywordFilter,
    replacer: TextReplacer,
}

impl MessageProcessor {
    pub fn new(store: Arc<ConfigStore>, status: Arc<RelayStatus>) -> Self {
        Self {
            filter: KeywordFilter::new(store.clone()),
            replacer: TextReplacer::new(store.clone()),
            store,
            status,
        }
    }

    pub fn filter(&self) -> &KeywordFilter {
        &self.filter
    }

    pub fn replacer(&self) -> &TextReplacer {
        &self.replacer
    }

    /// Primary text and caption joined by a space.
    pub fn extract_text(message: &InboundMessage) -> String {
        let parts: Vec<&str> = [message.body.text(), message.body.caption()]
            .into_iter()
            .flatten()
            .collect();
        parts.join(" ").trim().to_string()
    }

    pub fn process(&self, message: &InboundMessage, source_group_id: i64) -> Option<String> {
        let text = Self::extract_text(message);
        if text.is_empty() {
            log::debug!(
                "Message {} from group {} has no text to process",
                message.id,
                source_group_id
            );
            return None;
        }

        let (filtering, text_processing) = {
            let config = self.store.read();
            (
                config.settings.enable_keyword_filtering,
                config.settings.enable_text_processing,
            )
        };

        if filtering && !self.filter.passes(&text, source_group_id) {
            log::info!(
                "Message {} from group {} blocked by keyword filter",
                message.id,
                source_group_id
            );
            RelayStatus::incr(&self.status.messages_filtered);
            return None;
        }

        let processed = if text_processing {
            let report = self.replacer.preview(&text, Some(source_group_id));
            if report.changed() {
                RelayStatus::incr(&self.status.text_replaced);
            }
            report.result
        } else {
            text
        };

        if processed.trim().is_empty() {
            log::info!(
                "Message {} from group {} is empty after replacement, not forwarding",
                message.id,
                source_group_id
            );
            return None;
        }

        RelayStatus::incr(&self.status.messages_processed);
        Some(processed)
    }
}
