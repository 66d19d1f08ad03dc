//! [`Transport`] over the Telegram Bot API, built on teloxide.

use super::{
    AttachmentKind, ChatInfo, EventSink, InboundEvent, InboundMessage, MediaPayload, MessageBody,
    Transport, TransportError,
};
use crate::config::limits;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::{Dispatcher, ShutdownToken, UpdateFilterExt};
use teloxide::dptree;
use teloxide::error_handlers::ErrorHandler;
use teloxide::payloads::{ForwardMessageSetters, SendMessageSetters};
use teloxide::prelude::{Message, Requester, ResponseResult, Update};
use teloxide::types::{ChatId, FileMeta, MessageId, ThreadId};
use teloxide::update_listeners::polling_default;
use teloxide::{ApiError, Bot, RequestError};
use tokio::time::Instant;

/// Chats each registered sink wants to hear about.
#[derive(Default)]
struct SubscriptionTable {
    entries: Mutex<Vec<(Vec<ChatId>, EventSink)>>,
}

impl SubscriptionTable {
    fn add(&self, chats: Vec<ChatId>, sink: EventSink) {
        self.entries.lock().push((chats, sink));
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn route(&self, event: InboundEvent) {
        let mut entries = self.entries.lock();
        entries.retain(|(_, sink)| !sink.is_closed());
        for (chats, sink) in entries.iter() {
            if chats.contains(&event.chat_id) {
                let _ = sink.send(event.clone());
            }
        }
    }
}

/// Decides when polling failures amount to a dropped session.
///
/// Teloxide's polling loop retries network errors forever, so the session
/// never ends on its own. A streak of `threshold` failures, each within
/// `window` of the previous one and with no update in between, counts as a
/// drop.
pub struct ConnectionWatch {
    threshold: u32,
    window: Duration,
    streak: Mutex<Option<(u32, Instant)>>,
    dropped: AtomicBool,
}

impl ConnectionWatch {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            streak: Mutex::new(None),
            dropped: AtomicBool::new(false),
        }
    }

    /// Records one failure; returns `true` once the streak reaches the threshold.
    pub fn record_failure(&self) -> bool {
        let now = Instant::now();
        let mut streak = self.streak.lock();
        let count = match *streak {
            Some((count, last)) if now.duration_since(last) <= self.window => count + 1,
            _ => 1,
        };
        *streak = Some((count, now));
        if count >= self.threshold {
            self.dropped.store(true, Ordering::SeqCst);
        }
        count >= self.threshold
    }

    pub fn record_success(&self) {
        self.streak.lock().take();
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

impl Default for ConnectionWatch {
    fn default() -> Self {
        Self::new(
            limits::POLLING_FAILURE_THRESHOLD,
            Duration::from_secs(limits::POLLING_FAILURE_WINDOW_SECS),
        )
    }
}

/// Polling error handler: logs every failure and stops the dispatcher once
/// the [`ConnectionWatch`] reports a drop.
struct PollingErrors {
    watch: Arc<ConnectionWatch>,
    shutdown: ShutdownToken,
}

impl ErrorHandler<RequestError> for PollingErrors {
    fn handle_error(self: Arc<Self>, error: RequestError) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let counts = matches!(
            error,
            RequestError::Network(_) | RequestError::Io(_) | RequestError::Api(ApiError::InvalidToken)
        );
        if !counts {
            log::warn!("Polling error: {}", error);
        } else if self.watch.record_failure() {
            log::error!("Polling keeps failing ({}), treating the connection as lost", error);
            // Only initiates the stop; dispatch() returns once it completes.
            if self.shutdown.shutdown().is_err() {
                log::debug!("Dispatcher already stopping");
            }
        } else {
            log::warn!("Polling failed: {}", error);
        }
        Box::pin(async {})
    }
}

pub struct TelegramTransport {
    bot: Bot,
    subscriptions: Arc<SubscriptionTable>,
    shutdown: Mutex<Option<ShutdownToken>>,
    username: Mutex<Option<String>>,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            subscriptions: Arc::new(SubscriptionTable::default()),
            shutdown: Mutex::new(None),
            username: Mutex::new(None),
        }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Bot::new(token))
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        match self.bot.get_me().await {
            Ok(me) => {
                log::info!("Connected to Telegram as @{}", me.username());
                *self.username.lock() = Some(me.username().to_string());
                Ok(())
            }
            // Reachable but rejected: is_authorized reports it.
            Err(RequestError::Api(ApiError::InvalidToken)) => Ok(()),
            Err(e) => Err(map_request_error(e)),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let token = self.shutdown.lock().clone();
        if let Some(token) = token {
            match token.shutdown() {
                Ok(done) => done.await,
                Err(_) => log::debug!("Dispatcher is not running, nothing to stop"),
            }
        }
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, TransportError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(true),
            Err(RequestError::Api(ApiError::InvalidToken)) => Ok(false),
            Err(e) => Err(map_request_error(e)),
        }
    }

    async fn get_entity(&self, chat_id: ChatId) -> Result<ChatInfo, TransportError> {
        match self.bot.get_chat(chat_id).await {
            Ok(chat) => Ok(ChatInfo {
                id: chat_id,
                title: chat.title().map(str::to_string),
            }),
            Err(RequestError::Api(ApiError::ChatNotFound)) => Err(TransportError::ChatNotFound(chat_id)),
            Err(e) => Err(map_request_error(e)),
        }
    }

    async fn get_messages(
        &self,
        _chat_id: ChatId,
        _limit: usize,
    ) -> Result<Vec<InboundMessage>, TransportError> {
        Err(TransportError::Unsupported("bots cannot read chat history"))
    }

    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError> {
        let mut request = self.bot.send_message(chat_id, text);
        if let Some(topic) = reply_to {
            request = request.message_thread_id(ThreadId(topic));
        }
        request.await.map_err(map_request_error)?;
        Ok(())
    }

    async fn forward(
        &self,
        chat_id: ChatId,
        message: &InboundMessage,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError> {
        let mut request = self.bot.forward_message(chat_id, message.chat_id, message.id);
        if let Some(topic) = reply_to {
            request = request.message_thread_id(ThreadId(topic));
        }
        request.await.map_err(map_request_error)?;
        Ok(())
    }

    fn subscribe(&self, chats: Vec<ChatId>, sink: EventSink) {
        self.subscriptions.add(chats, sink);
    }

    fn clear_subscriptions(&self) {
        self.subscriptions.clear();
    }

    fn username(&self) -> Option<String> {
        self.username.lock().clone()
    }

    async fn run_until_disconnected(&self) -> Result<(), TransportError> {
        let watch = Arc::new(ConnectionWatch::default());
        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(route_update))
            .branch(Update::filter_channel_post().endpoint(route_update));

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.subscriptions.clone(), watch.clone()])
            .default_handler(|_| async {})
            .enable_ctrlc_handler()
            .build();

        let token = dispatcher.shutdown_token();
        *self.shutdown.lock() = Some(token.clone());
        let listener = polling_default(self.bot.clone()).await;
        let errors = Arc::new(PollingErrors {
            watch: watch.clone(),
            shutdown: token,
        });
        dispatcher.dispatch_with_listener(listener, errors).await;
        self.shutdown.lock().take();

        // Ctrl-C and disconnect() stop the dispatcher without tripping the watch
        if watch.is_dropped() {
            Err(TransportError::Connection("Telegram polling keeps failing".into()))
        } else {
            Ok(())
        }
    }
}

async fn route_update(
    msg: Message,
    subscriptions: Arc<SubscriptionTable>,
    watch: Arc<ConnectionWatch>,
) -> ResponseResult<()> {
    watch.record_success();
    match inbound_from_message(&msg) {
        Some(message) => subscriptions.route(InboundEvent::new(message)),
        None => log::debug!("Ignoring service message {} in chat {}", msg.id, msg.chat.id),
    }
    Ok(())
}

/// Converts a teloxide message into the relay's message shape. Service
/// messages without text or attachment yield `None`.
pub fn inbound_from_message(msg: &Message) -> Option<InboundMessage> {
    let media = media_payload(msg);
    let text = msg.text().map(str::to_string);
    let caption = msg.caption().map(str::to_string);

    let body = match (text, media) {
        (Some(text), None) => MessageBody::Text(text),
        (None, Some(media)) => MessageBody::Media { media, caption },
        (Some(text), Some(media)) => MessageBody::TextWithMedia { text, media, caption },
        (None, None) => return None,
    };

    Some(InboundMessage {
        id: msg.id,
        chat_id: msg.chat.id,
        body,
    })
}

fn media_payload(msg: &Message) -> Option<MediaPayload> {
    let file = |kind: AttachmentKind, meta: &FileMeta| MediaPayload {
        kind,
        file_id: Some(meta.id.to_string()),
    };

    if let Some(sizes) = msg.photo() {
        sizes.last().map(|largest| file(AttachmentKind::Photo, &largest.file))
    } else if let Some(video) = msg.video() {
        Some(file(AttachmentKind::Video, &video.file))
    } else if let Some(animation) = msg.animation() {
        Some(file(AttachmentKind::Animation, &animation.file))
    } else if let Some(document) = msg.document() {
        Some(file(AttachmentKind::Document, &document.file))
    } else if let Some(audio) = msg.audio() {
        Some(file(AttachmentKind::Audio, &audio.file))
    } else if let Some(voice) = msg.voice() {
        Some(file(AttachmentKind::Voice, &voice.file))
    } else if let Some(note) = msg.video_note() {
        Some(file(AttachmentKind::VideoNote, &note.file))
    } else if let Some(sticker) = msg.sticker() {
        Some(file(AttachmentKind::Sticker, &sticker.file))
    } else if msg.location().is_some() || msg.contact().is_some() || msg.poll().is_some() {
        Some(MediaPayload {
            kind: AttachmentKind::Other,
            file_id: None,
        })
    } else {
        None
    }
}

fn map_request_error(err: RequestError) -> TransportError {
    match err {
        RequestError::RetryAfter(wait) => TransportError::FloodWait(wait.duration()),
        RequestError::Network(e) => TransportError::Connection(e.to_string()),
        RequestError::Io(e) => TransportError::Connection(e.to_string()),
        RequestError::Api(ApiError::InvalidToken) => TransportError::Unauthorized,
        other => TransportError::Request(other.to_string()),
    }
}
