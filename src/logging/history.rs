//! Bounded in-memory history of recent log entries
//!
//! Provides a thread-safe ring buffer that keeps the most recent entries for crash dumps.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::entry::LogEntry;

/// Default number of entries retained for crash dumps
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// Thread-safe ring buffer of log entries
pub struct BoundedHistory {
    /// Retained entries, oldest first (capped at capacity)
    entries: Mutex<VecDeque<LogEntry>>,
    /// Maximum entries to keep
    capacity: usize,
}

impl Default for BoundedHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl BoundedHistory {
    /// Create a new history with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // A panic elsewhere cannot leave the deque half-updated.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry, evicting the oldest ones past capacity
    pub fn insert(&self, entry: LogEntry) {
        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Copy the current contents, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Get the number of retained entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the history is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all retained entries
    pub fn clear(&self) {
        self.lock().clear();
    }
}
