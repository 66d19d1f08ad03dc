use std::sync::Arc;
use telegram_relay_bot::keep_alive::routes;
use telegram_relay_bot::{RelayState, RelayStatus};

#[tokio::test]
async fn test_ping_returns_pong() {
    let api = routes(Arc::new(RelayStatus::new()));

    let res = warp::test::request().method("GET").path("/ping").reply(&api).await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.body(), "pong");
}

#[tokio::test]
async fn test_health_reports_service() {
    let api = routes(Arc::new(RelayStatus::new()));

    let res = warp::test::request().method("GET").path("/health").reply(&api).await;
    assert_eq!(res.status(), 200);

    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "telegram_relay_bot");
    assert!(body["timestamp"].is_string());
    assert!(body["uptime"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn test_index_page_shows_state() {
    let status = Arc::new(RelayStatus::new());
    let api = routes(status.clone());

    let res = warp::test::request().method("GET").path("/").reply(&api).await;
    assert_eq!(res.status(), 200);
    let page = String::from_utf8(res.body().to_vec()).unwrap();
    assert!(page.contains("Stopped"));

    status.set_state(RelayState::Running);
    let res = warp::test::request().method("GET").path("/").reply(&api).await;
    let page = String::from_utf8(res.body().to_vec()).unwrap();
    assert!(page.contains("Running"));
}

#[tokio::test]
async fn test_unknown_path_is_rejected() {
    let api = routes(Arc::new(RelayStatus::new()));

    let res = warp::test::request().method("GET").path("/nope").reply(&api).await;
    assert_eq!(res.status(), 404);
}
