use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of the relay client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayState {
    Stopped,
    Starting,
    Running,
    Reconnecting,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayState::Stopped => write!(f, "Stopped"),
            RelayState::Starting => write!(f, "Starting"),
            RelayState::Running => write!(f, "Running"),
            RelayState::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// Status record shared between the relay tasks and the health endpoint.
///
/// Counters are plain relaxed atomics; readers only ever need an
/// approximate, eventually consistent view.
#[derive(Debug)]
pub struct RelayStatus {
    state: Mutex<RelayState>,
    started_at: DateTime<Utc>,
    pub messages_received: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub messages_processed: AtomicU64,
    pub messages_filtered: AtomicU64,
    pub text_replaced: AtomicU64,
    pub media_forwarded: AtomicU64,
    pub sends_succeeded: AtomicU64,
    pub sends_failed: AtomicU64,
    pub queue_depth: AtomicU64,
    pub errors: AtomicU64,
}

/// Point-in-time copy of [`RelayStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: RelayState,
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub messages_received: u64,
    pub duplicates_skipped: u64,
    pub messages_processed: u64,
    pub messages_filtered: u64,
    pub text_replaced: u64,
    pub media_forwarded: u64,
    pub sends_succeeded: u64,
    pub sends_failed: u64,
    pub queue_depth: u64,
    pub errors: u64,
}

impl Default for RelayStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStatus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RelayState::Stopped),
            started_at: Utc::now(),
            messages_received: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            messages_processed: AtomicU64::new(0),
            messages_filtered: AtomicU64::new(0),
            text_replaced: AtomicU64::new(0),
            media_forwarded: AtomicU64::new(0),
            sends_succeeded: AtomicU64::new(0),
            sends_failed: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> RelayState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: RelayState) {
        let mut current = self.state.lock();
        if *current != state {
            log::debug!("Relay state {} -> {}", *current, state);
            *current = state;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RelayState::Running
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr(counter: &AtomicU64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let state = self.state();
        StatusSnapshot {
            state,
            running: state == RelayState::Running,
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            messages_received: load(&self.messages_received),
            duplicates_skipped: load(&self.duplicates_skipped),
            messages_processed: load(&self.messages_processed),
            messages_filtered: load(&self.messages_filtered),
            text_replaced: load(&self.text_replaced),
            media_forwarded: load(&self.media_forwarded),
            sends_succeeded: load(&self.sends_succeeded),
            sends_failed: load(&self.sends_failed),
            queue_depth: load(&self.queue_depth),
            errors: load(&self.errors),
        }
    }
}
