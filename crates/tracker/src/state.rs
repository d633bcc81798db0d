//! Per-subscription bookkeeping: where the stream is, what it already
//! delivered, and the last value a property stream emitted.

use std::collections::{HashSet, VecDeque};

use crate::events::Cursor;

#[derive(Debug)]
pub struct SubscriptionState {
    last_cursor: Option<Cursor>,
    recent: VecDeque<Cursor>,
    recent_set: HashSet<Cursor>,
    window: usize,
    last_value: Option<String>,
    suppressed: u64,
}

impl SubscriptionState {
    /// `window` bounds how many recent cursors are remembered.
    pub fn new(window: usize) -> Self {
        Self {
            last_cursor: None,
            recent: VecDeque::with_capacity(window.min(1_024)),
            recent_set: HashSet::new(),
            window: window.max(1),
            last_value: None,
            suppressed: 0,
        }
    }

    pub fn last_cursor(&self) -> Option<Cursor> {
        self.last_cursor
    }

    /// First cursor a replay must fetch: just past the last seen entry, or
    /// `origin` when nothing was seen yet.
    pub fn resume_from(&self, origin: Cursor) -> Cursor {
        match self.last_cursor {
            Some(cursor) => cursor.successor().max(origin),
            None => origin,
        }
    }

    /// Records `cursor` as seen. Returns false for a redelivered entry or one
    /// behind the stream's position; the caller must drop it.
    pub fn admit(&mut self, cursor: Cursor) -> bool {
        if self.recent_set.contains(&cursor) {
            self.suppressed += 1;
            return false;
        }
        if matches!(self.last_cursor, Some(last) if cursor <= last) {
            self.suppressed += 1;
            return false;
        }

        self.last_cursor = Some(cursor);
        self.recent.push_back(cursor);
        self.recent_set.insert(cursor);
        while self.recent.len() > self.window {
            if let Some(evicted) = self.recent.pop_front() {
                self.recent_set.remove(&evicted);
            }
        }
        true
    }

    /// Stores `serialized` and returns true if it differs from the last
    /// emitted value.
    pub fn value_changed(&mut self, serialized: String) -> bool {
        if self.last_value.as_deref() == Some(serialized.as_str()) {
            return false;
        }
        self.last_value = Some(serialized);
        true
    }

    /// Entries dropped as duplicates so far.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
