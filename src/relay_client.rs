//! Lifecycle of the relay: startup checks, subscriptions, the two pipeline
//! tasks, and reconnection after the transport drops.

use crate::config::limits;
use crate::config_store::ConfigStore;
use crate::forwarding::{forwarding_queue, ForwardingWorker};
use crate::handlers::MessageHandler;
use crate::status::{RelayState, RelayStatus};
use crate::transport::{EventSink, InboundEvent, Transport, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::ChatId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("bot is not authorized, check BOT_TOKEN")]
    Unauthorized,
    #[error("authorization lost while reconnecting")]
    AuthorizationLost,
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
    #[error("relay client has not been started")]
    NotStarted,
}

struct PipelineTasks {
    handler: JoinHandle<()>,
    worker: JoinHandle<()>,
}

pub struct RelayClient {
    transport: Arc<dyn Transport>,
    store: Arc<ConfigStore>,
    status: Arc<RelayStatus>,
    strict_config: bool,
    sink: Mutex<Option<EventSink>>,
    tasks: Mutex<Option<PipelineTasks>>,
}

impl RelayClient {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<ConfigStore>, status: Arc<RelayStatus>) -> Self {
        Self {
            transport,
            store,
            status,
            strict_config: true,
            sink: Mutex::new(None),
            tasks: Mutex::new(None),
        }
    }

    /// When off, validation problems are logged and startup continues.
    pub fn with_strict_config(mut self, strict: bool) -> Self {
        self.strict_config = strict;
        self
    }

    pub fn state(&self) -> RelayState {
        self.status.state()
    }

    pub fn status(&self) -> &Arc<RelayStatus> {
        &self.status
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub async fn start(&self) -> Result<(), RelayError> {
        if self.tasks.lock().is_some() {
            log::warn!("Relay client already started");
            return Ok(());
        }
        self.status.set_state(RelayState::Starting);

        if let Err(e) = self.open_session().await {
            self.status.set_state(RelayState::Stopped);
            return Err(e);
        }

        let issues = self.store.validate();
        for issue in &issues {
            log::error!("Configuration error: {}", issue);
        }
        if !issues.is_empty() && self.strict_config {
            self.status.set_state(RelayState::Stopped);
            return Err(RelayError::InvalidConfig(issues));
        }

        self.verify_group_access().await;

        let (tx, rx) = mpsc::unbounded_channel::<InboundEvent>();
        self.register_subscriptions(&tx);

        let (producer, consumer) = forwarding_queue(self.status.clone());
        let handler = MessageHandler::new(
            self.transport.clone(),
            self.store.clone(),
            self.status.clone(),
            producer,
        );
        let worker = ForwardingWorker::new(self.transport.clone(), self.store.clone(), self.status.clone());

        *self.tasks.lock() = Some(PipelineTasks {
            handler: tokio::spawn(handler.run(rx)),
            worker: tokio::spawn(worker.run(consumer)),
        });
        *self.sink.lock() = Some(tx);

        self.probe_reception().await;

        self.status.set_state(RelayState::Running);
        let config = self.store.read();
        log::info!(
            "Relay running: {} source group(s) -> {} target group(s)",
            config.source_groups.len(),
            config.target_groups.len()
        );
        Ok(())
    }

    /// Keeps the session alive, reconnecting after unexpected drops.
    ///
    /// Returns `Ok` after a deliberate disconnect and
    /// [`RelayError::AuthorizationLost`] when a reconnect finds the bot no
    /// longer authorized.
    pub async fn run_until_disconnected(&self) -> Result<(), RelayError> {
        if self.sink.lock().is_none() {
            return Err(RelayError::NotStarted);
        }

        loop {
            match self.transport.run_until_disconnected().await {
                Ok(()) => {
                    log::info!("Transport disconnected");
                    self.status.set_state(RelayState::Stopped);
                    return Ok(());
                }
                Err(e) => {
                    log::error!("Connection lost: {}", e);
                    RelayStatus::incr(&self.status.errors);
                    self.status.set_state(RelayState::Reconnecting);
                    self.reconnect().await?;
                }
            }
        }
    }

    /// Disconnects and stops both pipeline tasks. With `drain` the items
    /// already queued are forwarded first, otherwise they are dropped.
    pub async fn shutdown(&self, drain: bool) -> Result<(), RelayError> {
        log::info!("Shutting down relay (drain: {})", drain);
        if let Err(e) = self.transport.disconnect().await {
            log::warn!("Error while disconnecting: {}", e);
        }
        self.transport.clear_subscriptions();
        self.sink.lock().take();

        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            if drain {
                if let Err(e) = tasks.handler.await {
                    log::error!("Message handler task failed: {}", e);
                }
                if let Err(e) = tasks.worker.await {
                    log::error!("Forwarding worker task failed: {}", e);
                }
            } else {
                tasks.handler.abort();
                tasks.worker.abort();
            }
        }

        self.status.set_state(RelayState::Stopped);
        Ok(())
    }

    async fn open_session(&self) -> Result<(), RelayError> {
        self.transport.connect().await?;
        if !self.transport.is_authorized().await? {
            log::error!("Bot is not authorized");
            return Err(RelayError::Unauthorized);
        }
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), RelayError> {
        loop {
            log::info!("Attempting to reconnect in {}s", limits::RECONNECT_DELAY_SECS);
            sleep(Duration::from_secs(limits::RECONNECT_DELAY_SECS)).await;

            match self.try_reconnect().await {
                Ok(true) => {
                    log::info!("Reconnected, re-registering subscriptions");
                    self.transport.clear_subscriptions();
                    let sink = self.sink.lock().clone();
                    match sink {
                        Some(sink) => self.register_subscriptions(&sink),
                        None => return Err(RelayError::NotStarted),
                    }
                    self.status.set_state(RelayState::Running);
                    return Ok(());
                }
                Ok(false) => {
                    log::error!("Authorization lost during reconnect");
                    self.status.set_state(RelayState::Stopped);
                    return Err(RelayError::AuthorizationLost);
                }
                Err(e) => {
                    log::error!(
                        "Reconnect failed: {}, retrying in {}s",
                        e,
                        limits::RECONNECT_FAILURE_DELAY_SECS
                    );
                    RelayStatus::incr(&self.status.errors);
                    sleep(Duration::from_secs(limits::RECONNECT_FAILURE_DELAY_SECS)).await;
                }
            }
        }
    }

    async fn try_reconnect(&self) -> Result<bool, TransportError> {
        self.transport.disconnect().await?;
        self.transport.connect().await?;
        self.transport.is_authorized().await
    }

    /// One subscription per source group, an aggregate one over all of them,
    /// and the admin chat. Overlapping deliveries are dropped by dedup.
    fn register_subscriptions(&self, sink: &EventSink) {
        let config = self.store.read();
        let sources: Vec<ChatId> = config.source_groups.iter().map(|id| ChatId(*id)).collect();

        for chat in &sources {
            self.transport.subscribe(vec![*chat], sink.clone());
        }
        self.transport.subscribe(sources.clone(), sink.clone());
        if let Some(admin) = config.settings.admin_chat_id {
            self.transport.subscribe(vec![ChatId(admin)], sink.clone());
        }

        log::info!("Registered subscriptions for {} source group(s)", sources.len());
    }

    async fn verify_group_access(&self) {
        let sources = self.store.read().source_groups.clone();
        for group_id in sources {
            let chat = ChatId(group_id);
            match self.transport.get_entity(chat).await {
                Ok(info) => log::info!(
                    "Access verified for group {}: {}",
                    group_id,
                    info.title.as_deref().unwrap_or("Unknown")
                ),
                Err(e) => {
                    log::error!("Cannot access source group {}: {}", group_id, e);
                    continue;
                }
            }

            match self.transport.get_messages(chat, limits::ACCESS_CHECK_LIMIT).await {
                Ok(messages) => log::info!(
                    "Can read messages from group {} ({} found)",
                    group_id,
                    messages.len()
                ),
                Err(TransportError::Unsupported(reason)) => {
                    log::debug!("Skipping read check for group {}: {}", group_id, reason)
                }
                Err(e) => log::warn!("Cannot read messages from group {}: {}", group_id, e),
            }
        }
    }

    async fn probe_reception(&self) {
        let sources = self.store.read().source_groups.clone();
        for group_id in sources {
            match self
                .transport
                .get_messages(ChatId(group_id), limits::RECEPTION_PROBE_LIMIT)
                .await
            {
                Ok(messages) => {
                    log::info!("Group {}: {} recent message(s)", group_id, messages.len());
                    for message in messages {
                        log::debug!(
                            "Group {} message {}: {}",
                            group_id,
                            message.id,
                            message.preview(limits::LOG_PREVIEW_CHARS)
                        );
                    }
                }
                Err(TransportError::Unsupported(reason)) => {
                    log::debug!("Skipping reception probe for group {}: {}", group_id, reason)
                }
                Err(e) => log::warn!("Reception probe failed for group {}: {}", group_id, e),
            }
        }
    }
}
