//! Ordered event recording
//!
//! A cloneable, thread-safe log that dispatch handlers push into so tests
//! can assert on the exact order of application events.

use std::sync::{Arc, Mutex};

/// Shared append-only log of test observations.
#[derive(Debug)]
pub struct EventLog<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for EventLog<T> {
    fn clone(&self) -> Self {
        EventLog {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for EventLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventLog<T> {
    /// Empty log.
    pub fn new() -> Self {
        EventLog {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append an entry.
    pub fn push(&self, entry: T) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Number of entries so far.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> EventLog<T> {
    /// Snapshot of all entries in arrival order.
    pub fn entries(&self) -> Vec<T> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}
