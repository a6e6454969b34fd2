use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::track::PlayHistoryEntry;

/// Log of tracks that have started playing
pub trait PlayHistoryLog: Send + Sync {
    /// Up to `limit` entries, most recent first
    fn recent(&self, limit: usize) -> Vec<PlayHistoryEntry>;

    fn append(&self, entry: PlayHistoryEntry);
}

/// Bounded in-memory history
pub struct MemoryHistory {
    entries: Mutex<VecDeque<PlayHistoryEntry>>,
    capacity: usize,
}

impl MemoryHistory {
    pub const DEFAULT_CAPACITY: usize = 500;

    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl PlayHistoryLog for MemoryHistory {
    fn recent(&self, limit: usize) -> Vec<PlayHistoryEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().take(limit).cloned().collect()
    }

    fn append(&self, entry: PlayHistoryEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_is_most_recent_first() {
        let history = MemoryHistory::default();
        history.append(PlayHistoryEntry::now("a", false));
        history.append(PlayHistoryEntry::now("b", true));
        history.append(PlayHistoryEntry::now("c", true));

        let ids: Vec<String> = history.recent(2).into_iter().map(|e| e.track_id).collect();
        assert_eq!(ids, ["c", "b"]);
        assert_eq!(history.recent(10).len(), 3);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let history = MemoryHistory::new(2);
        for id in ["a", "b", "c"] {
            history.append(PlayHistoryEntry::now(id, true));
        }
        let ids: Vec<String> = history.recent(10).into_iter().map(|e| e.track_id).collect();
        assert_eq!(ids, ["c", "b"]);
    }
}
