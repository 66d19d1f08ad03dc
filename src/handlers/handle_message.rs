use crate::admin_handlers::{handle_admin_command, AdminCommand, AdminContext};
use crate::config::limits;
use crate::config_store::ConfigStore;
use crate::dedup::{DedupTracker, MessageKey};
use crate::forwarding::{QueueClosed, QueueProducer, WorkItem};
use crate::message_processor::MessageProcessor;
use crate::status::RelayStatus;
use crate::transport::{InboundEvent, Transport};
use std::sync::Arc;
use teloxide::types::ChatId;
use teloxide::utils::command::BotCommands;
use tokio::sync::mpsc;

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Duplicate,
    AdminCommand,
    UnknownSource,
    MediaQueued,
    MediaDisabled,
    TextQueued,
    Dropped,
}

/// Ingestion side of the relay: turns subscription events into work items.
///
/// Runs on a single task and owns the dedup set, so events are handled in
/// the order the transport delivered them.
pub struct MessageHandler {
    transport: Arc<dyn Transport>,
    store: Arc<ConfigStore>,
    status: Arc<RelayStatus>,
    processor: MessageProcessor,
    dedup: DedupTracker,
    queue: QueueProducer,
}

impl MessageHandler {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<ConfigStore>,
        status: Arc<RelayStatus>,
        queue: QueueProducer,
    ) -> Self {
        Self {
            processor: MessageProcessor::new(store.clone(), status.clone()),
            transport,
            store,
            status,
            dedup: DedupTracker::new(),
            queue,
        }
    }

    pub fn processor(&self) -> &MessageProcessor {
        &self.processor
    }

    /// Handles events until every subscription sink is dropped.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<InboundEvent>) {
        log::info!("Message handler started");
        while let Some(event) = events.recv().await {
            if let Err(QueueClosed(item)) = self.handle_event(event).await {
                log::error!(
                    "Forwarding queue closed, dropping message {} from group {}",
                    item.message.id,
                    item.message.chat_id
                );
                break;
            }
        }
        log::info!("Message handler stopped");
    }

    pub async fn handle_event(&mut self, event: InboundEvent) -> Result<Disposition, QueueClosed> {
        let message = event.message;
        let group_id = event.chat_id.0;
        RelayStatus::incr(&self.status.messages_received);

        if !self.dedup.check_and_record(MessageKey::new(event.chat_id, message.id)) {
            log::debug!("Skipping duplicate message {} from group {}", message.id, group_id);
            RelayStatus::incr(&self.status.duplicates_skipped);
            return Ok(Disposition::Duplicate);
        }

        let (admin_chat, is_source, media_forwarding) = {
            let config = self.store.read();
            (
                config.settings.admin_chat_id,
                config.is_source_group(group_id),
                config.settings.enable_media_forwarding,
            )
        };

        if admin_chat == Some(group_id) {
            let bot_name = self.transport.username().unwrap_or_default();
            if let Some(cmd) = message.body.text().and_then(|t| AdminCommand::parse(t, &bot_name).ok()) {
                self.run_admin_command(cmd, group_id).await;
                return Ok(Disposition::AdminCommand);
            }
        }

        if !is_source {
            log::warn!("Received message {} from unknown group {}", message.id, group_id);
            return Ok(Disposition::UnknownSource);
        }

        log::info!(
            "Received message {} from group {}: {}",
            message.id,
            group_id,
            message.preview(limits::LOG_PREVIEW_CHARS)
        );

        if message.has_media() && MessageProcessor::extract_text(&message).is_empty() {
            if !media_forwarding {
                log::info!(
                    "Media forwarding disabled, dropping message {} from group {}",
                    message.id,
                    group_id
                );
                return Ok(Disposition::MediaDisabled);
            }
            self.queue.enqueue(WorkItem::media_only(message))?;
            return Ok(Disposition::MediaQueued);
        }

        match self.processor.process(&message, group_id) {
            Some(text) => {
                self.queue.enqueue(WorkItem::text(message, text))?;
                Ok(Disposition::TextQueued)
            }
            None => {
                log::debug!("Message {} from group {} not forwarded", message.id, group_id);
                Ok(Disposition::Dropped)
            }
        }
    }

    async fn run_admin_command(&self, cmd: AdminCommand, chat_id: i64) {
        log::info!("Admin command in chat {}: {:?}", chat_id, cmd);
        let ctx = AdminContext {
            store: &self.store,
            status: &self.status,
            processor: &self.processor,
        };
        let reply = match handle_admin_command(cmd, &ctx) {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Admin command in chat {} failed: {:#}", chat_id, e);
                format!("Error: {:#}", e)
            }
        };
        if let Err(e) = self.transport.send(ChatId(chat_id), &reply, None).await {
            log::error!("Failed to reply to admin chat {}: {}", chat_id, e);
            RelayStatus::incr(&self.status.errors);
        }
    }
}
