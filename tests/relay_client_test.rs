mod common;

use common::{as_transport, relay_config, store_with, MockTransport, Sent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use telegram_relay_bot::config::RelayConfig;
use telegram_relay_bot::transport::{AttachmentKind, InboundMessage, TransportError};
use telegram_relay_bot::{RelayClient, RelayError, RelayState, RelayStatus};
use tokio::time::Instant;

fn client(mock: &Arc<MockTransport>, config: RelayConfig) -> RelayClient {
    RelayClient::new(as_transport(mock), store_with(config), Arc::new(RelayStatus::new()))
}

/// Passes startup validation: filtering is off, so no keywords are required.
fn ready_config() -> RelayConfig {
    let mut config = relay_config();
    config.filters.enabled = false;
    config
}

fn texts_to(mock: &MockTransport, chat: i64) -> Vec<String> {
    mock.sent()
        .into_iter()
        .filter_map(|s| match s {
            Sent::Text { chat: c, text, .. } if c == chat => Some(text),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_filter_replace_and_forward() {
    let mock = MockTransport::new();
    let mut config = relay_config();
    config.target_groups = vec![-900];
    config.filters.keywords = vec!["Rain".into()];
    config
        .text_replacements
        .insert("Rain in India".into(), "Alert".into());
    config.settings.forward_delay = 2.0;
    let client = client(&mock, config);

    client.start().await.unwrap();
    assert_eq!(client.state(), RelayState::Running);

    mock.emit(InboundMessage::text(1, -100, "hello Rain in India"));
    mock.emit(InboundMessage::text(2, -100, "sunny skies"));
    mock.emit(InboundMessage::text(3, -200, "Rain again"));

    client.shutdown(true).await.unwrap();
    assert_eq!(client.state(), RelayState::Stopped);

    assert_eq!(texts_to(&mock, -900), vec!["hello Alert", "Rain again"]);
    let attempts = mock.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].at - attempts[0].at, Duration::from_secs(2));

    // Each message arrives via its group subscription and the aggregate one
    let status = client.status();
    assert_eq!(status.messages_received.load(Ordering::Relaxed), 6);
    assert_eq!(status.duplicates_skipped.load(Ordering::Relaxed), 3);
    assert_eq!(status.messages_filtered.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn test_media_only_message_is_forwarded_natively() {
    let mock = MockTransport::new();
    let client = client(&mock, ready_config());

    client.start().await.unwrap();
    mock.emit(InboundMessage::media(
        4,
        -100,
        AttachmentKind::Photo,
        None,
    ));
    client.shutdown(true).await.unwrap();

    assert_eq!(
        mock.sent(),
        vec![
            Sent::Forward {
                chat: -900,
                from_chat: -100,
                message_id: 4,
                reply_to: None
            },
            Sent::Forward {
                chat: -901,
                from_chat: -100,
                message_id: 4,
                reply_to: None
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_admin_command_updates_config_and_replies() {
    let mock = MockTransport::new();
    let mut config = ready_config();
    config.settings.admin_chat_id = Some(-555);
    let store = store_with(config);
    let client = RelayClient::new(as_transport(&mock), store.clone(), Arc::new(RelayStatus::new()));

    client.start().await.unwrap();
    mock.emit(InboundMessage::text(1, -555, "/addkeyword storm"));
    mock.emit(InboundMessage::text(2, -555, "/addtarget not-a-number"));
    mock.emit(InboundMessage::text(3, -555, "just chatting"));
    client.shutdown(true).await.unwrap();

    assert_eq!(store.read().filters.keywords, vec!["storm".to_string()]);

    let replies = texts_to(&mock, -555);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0], "Added keyword: storm");
    assert!(replies[1].starts_with("Error:"));
    assert!(texts_to(&mock, -900).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_connection_loss() {
    let mock = MockTransport::new();
    let client = client(&mock, ready_config());
    client.start().await.unwrap();

    mock.script_session(Err(TransportError::Connection("dropped".into())));
    // Second session ends deliberately
    mock.end_session();

    let started = Instant::now();
    client.run_until_disconnected().await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(mock.connects(), 2);
    // Two groups plus the aggregate, registered afresh
    assert_eq!(mock.subscription_count(), 3);
    assert_eq!(client.state(), RelayState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_waits_longer_after_failed_attempt() {
    let mock = MockTransport::new();
    let client = client(&mock, ready_config());
    client.start().await.unwrap();

    mock.script_session(Err(TransportError::Connection("dropped".into())));
    mock.script_authorized(Err(TransportError::Connection("still down".into())));
    mock.end_session();

    let started = Instant::now();
    client.run_until_disconnected().await.unwrap();

    // 30s wait, failed attempt, 60s back-off, 30s wait, success
    assert_eq!(started.elapsed(), Duration::from_secs(120));
    assert_eq!(mock.connects(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_stops_when_authorization_is_lost() {
    let mock = MockTransport::new();
    let client = client(&mock, ready_config());
    client.start().await.unwrap();

    mock.script_session(Err(TransportError::Connection("dropped".into())));
    mock.script_authorized(Ok(false));

    let result = client.run_until_disconnected().await;
    assert!(matches!(result, Err(RelayError::AuthorizationLost)));
    assert_eq!(client.state(), RelayState::Stopped);

    client.shutdown(false).await.unwrap();
}

#[tokio::test]
async fn test_start_fails_when_not_authorized() {
    let mock = MockTransport::new();
    mock.script_authorized(Ok(false));
    let client = client(&mock, ready_config());

    let result = client.start().await;
    assert!(matches!(result, Err(RelayError::Unauthorized)));
    assert_eq!(client.state(), RelayState::Stopped);
    assert_eq!(mock.subscription_count(), 0);
}

#[tokio::test]
async fn test_strict_config_rejects_invalid_document() {
    let mock = MockTransport::new();
    let mut config = ready_config();
    config.target_groups.clear();

    let strict = client(&mock, config.clone());
    match strict.start().await {
        Err(RelayError::InvalidConfig(errors)) => {
            assert_eq!(errors, vec!["No target groups configured".to_string()])
        }
        other => panic!("expected invalid config, got {:?}", other),
    }

    let lenient = client(&mock, config).with_strict_config(false);
    lenient.start().await.unwrap();
    assert_eq!(lenient.state(), RelayState::Running);
    lenient.shutdown(false).await.unwrap();
}

#[tokio::test]
async fn test_run_before_start_is_an_error() {
    let mock = MockTransport::new();
    let client = client(&mock, ready_config());

    let result = client.run_until_disconnected().await;
    assert!(matches!(result, Err(RelayError::NotStarted)));
}
