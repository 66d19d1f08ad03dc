use crate::config::limits;
use indexmap::IndexSet;
use teloxide::types::{ChatId, MessageId};

/// Message ids are only unique within a chat, so dedup keys carry both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl MessageKey {
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self { chat_id, message_id }
    }
}

/// Bounded set of recently seen messages.
///
/// Entries are kept in insertion order; once the set grows past its capacity
/// the oldest `eviction` entries are dropped in one go. Owned by the single
/// ingestion task, so it needs no locking.
#[derive(Debug)]
pub struct DedupTracker {
    seen: IndexSet<MessageKey>,
    capacity: usize,
    eviction: usize,
}

impl Default for DedupTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::with_capacity(limits::DEDUP_CAPACITY, limits::DEDUP_EVICTION)
    }

    pub fn with_capacity(capacity: usize, eviction: usize) -> Self {
        Self {
            seen: IndexSet::with_capacity(capacity + 1),
            capacity,
            eviction: eviction.clamp(1, capacity.max(1)),
        }
    }

    pub fn seen(&self, key: &MessageKey) -> bool {
        self.seen.contains(key)
    }

    pub fn record(&mut self, key: MessageKey) {
        if self.seen.len() > self.capacity {
            let evict = self.eviction.min(self.seen.len());
            self.seen.drain(..evict);
            log::debug!("Dedup set over capacity, evicted {} oldest entries", evict);
        }
        self.seen.insert(key);
    }

    /// Records `key` and returns `true` if it had not been seen before.
    pub fn check_and_record(&mut self, key: MessageKey) -> bool {
        if self.seen(&key) {
            return false;
        }
        self.record(key);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
