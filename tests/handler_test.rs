mod common;

use common::{as_transport, relay_config, store_with, MockTransport, Sent, BOT_USERNAME};
use std::sync::Arc;
use telegram_relay_bot::config::RelayConfig;
use telegram_relay_bot::forwarding::{forwarding_queue, ForwardPayload, QueueConsumer};
use telegram_relay_bot::handlers::{Disposition, MessageHandler};
use telegram_relay_bot::status::RelayStatus;
use telegram_relay_bot::transport::{AttachmentKind, InboundEvent, InboundMessage};

fn handler(mock: &Arc<MockTransport>, config: RelayConfig) -> (MessageHandler, QueueConsumer) {
    let status = Arc::new(RelayStatus::new());
    let (producer, consumer) = forwarding_queue(status.clone());
    let handler = MessageHandler::new(as_transport(mock), store_with(config), status, producer);
    (handler, consumer)
}

fn event(message: InboundMessage) -> InboundEvent {
    InboundEvent::new(message)
}

#[tokio::test]
async fn test_duplicate_event_is_dropped() {
    let mock = MockTransport::new();
    let (mut handler, _queue) = handler(&mock, relay_config());

    let message = InboundMessage::text(1, -100, "hello");
    assert_eq!(
        handler.handle_event(event(message.clone())).await.unwrap(),
        Disposition::TextQueued
    );
    assert_eq!(
        handler.handle_event(event(message)).await.unwrap(),
        Disposition::Duplicate
    );
}

#[tokio::test]
async fn test_unknown_group_is_dropped() {
    let mock = MockTransport::new();
    let (mut handler, _queue) = handler(&mock, relay_config());

    let disposition = handler
        .handle_event(event(InboundMessage::text(1, -777, "hello")))
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::UnknownSource);
}

#[tokio::test]
async fn test_media_only_respects_media_setting() {
    let mock = MockTransport::new();
    let mut config = relay_config();
    config.settings.enable_media_forwarding = false;
    let (mut handler, _queue) = handler(&mock, config);

    let media = InboundMessage::media(1, -100, AttachmentKind::Video, None);
    assert_eq!(
        handler.handle_event(event(media)).await.unwrap(),
        Disposition::MediaDisabled
    );
}

#[tokio::test]
async fn test_captioned_media_goes_through_processor() {
    let mock = MockTransport::new();
    let mut config = relay_config();
    config.text_replacements.insert("storm".into(), "STORM".into());
    let (mut handler, mut queue) = handler(&mock, config);

    let captioned = InboundMessage::media(1, -100, AttachmentKind::Photo, Some("storm ahead".into()));
    let bare = InboundMessage::media(2, -100, AttachmentKind::Photo, None);
    handler.handle_event(event(captioned)).await.unwrap();
    handler.handle_event(event(bare)).await.unwrap();

    let first = queue.next().await.unwrap();
    assert_eq!(first.payload, ForwardPayload::Text("STORM ahead".into()));
    let second = queue.next().await.unwrap();
    assert!(second.is_media_only());
}

#[tokio::test]
async fn test_admin_command_from_other_chat_is_ignored() {
    let mock = MockTransport::new();
    let mut config = relay_config();
    config.settings.admin_chat_id = Some(-555);
    let (mut handler, mut queue) = handler(&mock, config);

    // Commands from a source group are relayed like any other text
    let disposition = handler
        .handle_event(event(InboundMessage::text(1, -100, "/addkeyword storm")))
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::TextQueued);
    assert!(handler.processor().filter().active_keywords().is_empty());
    assert_eq!(
        queue.next().await.unwrap().processed_text(),
        Some("/addkeyword storm")
    );
    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn test_closed_queue_is_reported() {
    let mock = MockTransport::new();
    let (mut handler, queue) = handler(&mock, relay_config());
    drop(queue);

    let result = handler
        .handle_event(event(InboundMessage::text(1, -100, "hello")))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_text_emptied_by_replacement_is_not_queued() {
    let mock = MockTransport::new();
    let mut config = relay_config();
    config.text_replacements.insert("Rain".into(), "".into());
    let (mut handler, mut queue) = handler(&mock, config);

    assert_eq!(
        handler
            .handle_event(event(InboundMessage::text(1, -100, "🌧 Rain")))
            .await
            .unwrap(),
        Disposition::Dropped
    );
    handler
        .handle_event(event(InboundMessage::text(2, -100, "sunny")))
        .await
        .unwrap();

    let next = queue.next().await.unwrap();
    assert_eq!(next.payload, ForwardPayload::Text("sunny".into()));
}

#[tokio::test]
async fn test_admin_command_addressed_to_bot_by_name() {
    let mock = MockTransport::new();
    let mut config = relay_config();
    config.settings.admin_chat_id = Some(-555);
    let (mut handler, _queue) = handler(&mock, config);

    let addressed = format!("/addkeyword@{} storm", BOT_USERNAME);
    assert_eq!(
        handler
            .handle_event(event(InboundMessage::text(1, -555, &addressed)))
            .await
            .unwrap(),
        Disposition::AdminCommand
    );
    assert_eq!(
        handler
            .handle_event(event(InboundMessage::text(2, -555, "/addkeyword@other_bot hail")))
            .await
            .unwrap(),
        Disposition::UnknownSource
    );

    assert_eq!(handler.processor().filter().active_keywords(), vec!["storm".to_string()]);
    assert_eq!(
        mock.sent(),
        vec![Sent::Text {
            chat: -555,
            text: "Added keyword: storm".into(),
            reply_to: None
        }]
    );
}
