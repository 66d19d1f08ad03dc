//! Boundary to the messaging platform.
//!
//! The relay pipeline only talks to the platform through [`Transport`]; the
//! platform's own message objects are converted into [`InboundMessage`] once,
//! at this boundary.

pub mod telegram;

use async_trait::async_trait;
use std::time::Duration;
use teloxide::types::{ChatId, MessageId};
use thiserror::Error;
use tokio::sync::mpsc;

pub use telegram::TelegramTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Animation,
    Sticker,
    VideoNote,
    Other,
}

/// Opaque handle to an attachment. The bytes stay on the platform and are
/// forwarded by reference, never downloaded or re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub kind: AttachmentKind,
    /// Platform file id; `None` for attachments without a file (locations, polls).
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Media {
        media: MediaPayload,
        caption: Option<String>,
    },
    TextWithMedia {
        text: String,
        media: MediaPayload,
        caption: Option<String>,
    },
}

impl MessageBody {
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(text) | MessageBody::TextWithMedia { text, .. } => Some(text.as_str()),
            MessageBody::Media { .. } => None,
        }
    }

    pub fn caption(&self) -> Option<&str> {
        match self {
            MessageBody::Media { caption, .. } | MessageBody::TextWithMedia { caption, .. } => {
                caption.as_deref()
            }
            MessageBody::Text(_) => None,
        }
    }

    pub fn media(&self) -> Option<&MediaPayload> {
        match self {
            MessageBody::Media { media, .. } | MessageBody::TextWithMedia { media, .. } => Some(media),
            MessageBody::Text(_) => None,
        }
    }
}

/// A message as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub body: MessageBody,
}

impl InboundMessage {
    pub fn text(id: i32, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            id: MessageId(id),
            chat_id: ChatId(chat_id),
            body: MessageBody::Text(text.into()),
        }
    }

    pub fn media(id: i32, chat_id: i64, kind: AttachmentKind, caption: Option<String>) -> Self {
        Self {
            id: MessageId(id),
            chat_id: ChatId(chat_id),
            body: MessageBody::Media {
                media: MediaPayload { kind, file_id: None },
                caption,
            },
        }
    }

    pub fn has_media(&self) -> bool {
        self.body.media().is_some()
    }

    /// Short prefix of the message text for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        match self.body.text().or(self.body.caption()) {
            Some(text) => text.chars().take(max_chars).collect(),
            None => "Media/No text".to_string(),
        }
    }
}

/// Event pushed by the transport for every new message in a subscribed chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub message: InboundMessage,
}

impl InboundEvent {
    pub fn new(message: InboundMessage) -> Self {
        Self {
            chat_id: message.chat_id,
            message,
        }
    }
}

pub type EventSink = mpsc::UnboundedSender<InboundEvent>;

/// Basic information about a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: ChatId,
    pub title: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The platform asked us to back off for the given duration.
    #[error("flood wait: retry after {0:?}")]
    FloodWait(Duration),
    #[error("connection lost: {0}")]
    Connection(String),
    #[error("not authorized")]
    Unauthorized,
    #[error("chat {0} not found or not accessible")]
    ChatNotFound(ChatId),
    #[error("operation not supported by this transport: {0}")]
    Unsupported(&'static str),
    #[error("request failed: {0}")]
    Request(String),
}

/// Messaging platform client used by the relay.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn is_authorized(&self) -> Result<bool, TransportError>;

    async fn get_entity(&self, chat_id: ChatId) -> Result<ChatInfo, TransportError>;

    /// Most recent messages of a chat, newest first.
    async fn get_messages(
        &self,
        chat_id: ChatId,
        limit: usize,
    ) -> Result<Vec<InboundMessage>, TransportError>;

    /// Sends `text` as a new message, into the topic rooted at `reply_to` if set.
    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError>;

    /// Natively forwards `message` (with its attachment) from its source chat.
    async fn forward(
        &self,
        chat_id: ChatId,
        message: &InboundMessage,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError>;

    /// Delivers new messages from `chats` to `sink` until subscriptions are cleared.
    fn subscribe(&self, chats: Vec<ChatId>, sink: EventSink);

    fn clear_subscriptions(&self);

    /// Username of the connected account, used to match `/cmd@name` commands.
    fn username(&self) -> Option<String>;

    /// Blocks while the session is up. `Ok` means a deliberate disconnect,
    /// `Err` an unexpected drop.
    async fn run_until_disconnected(&self) -> Result<(), TransportError>;
}
