#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use telegram_relay_bot::config::{RelayConfig, Settings, TopicBinding};
use telegram_relay_bot::config_store::ConfigStore;
use telegram_relay_bot::transport::{
    ChatInfo, EventSink, InboundEvent, InboundMessage, Transport, TransportError,
};
use teloxide::types::{ChatId, MessageId};
use tokio::sync::Notify;
use tokio::time::Instant;

/// One outbound call the relay made.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat: i64,
        text: String,
        reply_to: Option<i32>,
    },
    Forward {
        chat: i64,
        from_chat: i64,
        message_id: i32,
        reply_to: Option<i32>,
    },
}

impl Sent {
    pub fn chat(&self) -> i64 {
        match self {
            Sent::Text { chat, .. } | Sent::Forward { chat, .. } => *chat,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attempt {
    pub at: Instant,
    pub chat: i64,
    pub ok: bool,
}

/// Failure injected into the next send or forward to a chat.
pub enum Scripted {
    Fail,
    FloodWait(std::time::Duration),
}

#[derive(Default)]
struct MockState {
    sent: Vec<Sent>,
    attempts: Vec<Attempt>,
    failures: Vec<(i64, VecDeque<Scripted>)>,
    subscriptions: Vec<(Vec<ChatId>, EventSink)>,
    sessions: VecDeque<Result<(), TransportError>>,
    authorized: VecDeque<Result<bool, TransportError>>,
    connects: usize,
    disconnects: usize,
}

pub const BOT_USERNAME: &str = "relay_test_bot";

/// In-memory transport recording every call.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    session_end: Notify,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues failures for the next sends to `chat`.
    pub fn fail_next(&self, chat: i64, script: Vec<Scripted>) {
        self.state.lock().failures.push((chat, script.into()));
    }

    /// Result of the next `run_until_disconnected` call. With nothing
    /// scripted the session stays up until [`MockTransport::end_session`].
    pub fn script_session(&self, outcome: Result<(), TransportError>) {
        self.state.lock().sessions.push_back(outcome);
    }

    /// Results of the next `is_authorized` calls; defaults to authorized.
    pub fn script_authorized(&self, outcome: Result<bool, TransportError>) {
        self.state.lock().authorized.push_back(outcome);
    }

    pub fn end_session(&self) {
        self.session_end.notify_one();
    }

    /// Delivers `message` to every sink subscribed to its chat.
    pub fn emit(&self, message: InboundMessage) {
        let event = InboundEvent::new(message);
        let state = self.state.lock();
        for (chats, sink) in &state.subscriptions {
            if chats.contains(&event.chat_id) {
                let _ = sink.send(event.clone());
            }
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().sent.clone()
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.state.lock().attempts.clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    fn attempt(&self, chat: ChatId, outcome: Sent) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let scripted = state
            .failures
            .iter_mut()
            .find(|(c, _)| *c == chat.0)
            .and_then(|(_, script)| script.pop_front());

        let result = match scripted {
            Some(Scripted::Fail) => Err(TransportError::Request("scripted failure".into())),
            Some(Scripted::FloodWait(wait)) => Err(TransportError::FloodWait(wait)),
            None => Ok(()),
        };
        state.attempts.push(Attempt {
            at: Instant::now(),
            chat: chat.0,
            ok: result.is_ok(),
        });
        if result.is_ok() {
            state.sent.push(outcome);
        }
        result
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.state.lock().connects += 1;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.state.lock().disconnects += 1;
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, TransportError> {
        self.state.lock().authorized.pop_front().unwrap_or(Ok(true))
    }

    async fn get_entity(&self, chat_id: ChatId) -> Result<ChatInfo, TransportError> {
        Ok(ChatInfo {
            id: chat_id,
            title: Some(format!("Group {}", chat_id)),
        })
    }

    async fn get_messages(
        &self,
        _chat_id: ChatId,
        _limit: usize,
    ) -> Result<Vec<InboundMessage>, TransportError> {
        Ok(Vec::new())
    }

    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError> {
        self.attempt(
            chat_id,
            Sent::Text {
                chat: chat_id.0,
                text: text.to_string(),
                reply_to: reply_to.map(|m| m.0),
            },
        )
    }

    async fn forward(
        &self,
        chat_id: ChatId,
        message: &InboundMessage,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError> {
        self.attempt(
            chat_id,
            Sent::Forward {
                chat: chat_id.0,
                from_chat: message.chat_id.0,
                message_id: message.id.0,
                reply_to: reply_to.map(|m| m.0),
            },
        )
    }

    fn subscribe(&self, chats: Vec<ChatId>, sink: EventSink) {
        self.state.lock().subscriptions.push((chats, sink));
    }

    fn clear_subscriptions(&self) {
        self.state.lock().subscriptions.clear();
    }

    fn username(&self) -> Option<String> {
        Some(BOT_USERNAME.to_string())
    }

    async fn run_until_disconnected(&self) -> Result<(), TransportError> {
        let scripted = self.state.lock().sessions.pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => {
                self.session_end.notified().await;
                Ok(())
            }
        }
    }
}

/// Two sources, two targets, no delay between items.
pub fn relay_config() -> RelayConfig {
    RelayConfig {
        source_groups: vec![-100, -200],
        target_groups: vec![-900, -901],
        settings: Settings {
            forward_delay: 0.0,
            ..Settings::default()
        },
        ..RelayConfig::default()
    }
}

pub fn store_with(config: RelayConfig) -> Arc<ConfigStore> {
    Arc::new(ConfigStore::in_memory(config))
}

pub fn topic(topic_id: i32, name: &str) -> TopicBinding {
    TopicBinding {
        topic_id,
        topic_name: Some(name.to_string()),
    }
}

pub fn as_transport(mock: &Arc<MockTransport>) -> Arc<dyn Transport> {
    mock.clone()
}
