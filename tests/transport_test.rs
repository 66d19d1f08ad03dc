use std::time::Duration;
use telegram_relay_bot::transport::telegram::ConnectionWatch;

#[tokio::test(start_paused = true)]
async fn test_failure_streak_marks_connection_dropped() {
    let watch = ConnectionWatch::new(3, Duration::from_secs(60));

    assert!(!watch.record_failure());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!watch.record_failure());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(watch.record_failure());
    assert!(watch.is_dropped());
}

#[tokio::test(start_paused = true)]
async fn test_update_between_failures_resets_streak() {
    let watch = ConnectionWatch::new(3, Duration::from_secs(60));

    watch.record_failure();
    watch.record_failure();
    watch.record_success();
    assert!(!watch.record_failure());
    assert!(!watch.record_failure());
    assert!(!watch.is_dropped());
}

#[tokio::test(start_paused = true)]
async fn test_sparse_failures_never_drop() {
    let watch = ConnectionWatch::new(2, Duration::from_secs(60));

    for _ in 0..5 {
        assert!(!watch.record_failure());
        tokio::time::sleep(Duration::from_secs(61)).await;
    }
    assert!(!watch.is_dropped());
}
