//! In-memory ledger
//!
//! Serves as the event log and property source for tests and local runs.
//! Supports injected outages (calls fail with `Unavailable`), redelivery of
//! live entries, and shutting the live feeds down.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::adapter::{EventLog, LiveFeed, Property, PropertySource};
use crate::error::AdapterError;
use crate::events::{Cursor, EscrowEvent, EventKind, LogEntry, TradeRecord};

const DEFAULT_LIVE_CAPACITY: usize = 1_024;

#[derive(Default)]
struct LedgerState {
    entries: Vec<LogEntry>,
    properties: HashMap<Property, Value>,
    /// Sequence of the last closed ledger
    sequence: u32,
    /// Remaining calls that fail
    failures: u32,
    offline: bool,
    redeliver: bool,
}

/// Shared handle; clones see the same ledger.
#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
    live: Arc<Mutex<Option<broadcast::Sender<LogEntry>>>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::with_live_capacity(DEFAULT_LIVE_CAPACITY)
    }

    /// Live subscribers that fall more than `capacity` entries behind get an
    /// `Unavailable` error and must replay.
    pub fn with_live_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
            live: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Closes a ledger holding `events`, in order. Returns their cursors.
    pub fn close_ledger(&self, events: Vec<EscrowEvent>) -> Vec<Cursor> {
        let (entries, redeliver) = {
            let mut state = self.state.write();
            state.sequence += 1;
            let sequence = state.sequence;
            let entries: Vec<LogEntry> = events
                .into_iter()
                .enumerate()
                .map(|(index, event)| LogEntry { cursor: Cursor::new(sequence, index as u32), event })
                .collect();
            state.entries.extend(entries.iter().cloned());
            (entries, state.redeliver)
        };

        if let Some(live) = self.live.lock().as_ref() {
            for entry in &entries {
                // No receivers is fine
                let _ = live.send(entry.clone());
                if redeliver {
                    let _ = live.send(entry.clone());
                }
            }
        }

        debug!(count = entries.len(), "ledger closed");
        entries.into_iter().map(|entry| entry.cursor).collect()
    }

    /// Closes a ledger holding a single event.
    pub fn append(&self, event: EscrowEvent) -> Cursor {
        self.close_ledger(vec![event]).into_iter().next().unwrap_or_default()
    }

    pub fn set_property(&self, property: Property, value: Value) {
        self.state.write().properties.insert(property, value);
    }

    pub fn put_trade(&self, trade_id: u64, trade: &TradeRecord) -> Result<(), serde_json::Error> {
        self.put(Property::Trade(trade_id), trade)
    }

    pub fn put<T: Serialize>(&self, property: Property, value: &T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.set_property(property, value);
        Ok(())
    }

    pub fn remove_property(&self, property: &Property) {
        self.state.write().properties.remove(property);
    }

    /// The next `count` adapter calls fail with `Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.state.write().failures = count;
    }

    /// While offline every adapter call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.state.write().offline = offline;
    }

    /// Delivers every live entry twice from now on.
    pub fn set_redelivery(&self, redeliver: bool) {
        self.state.write().redeliver = redeliver;
    }

    /// Ends every live feed; later subscriptions fail with `Closed`.
    pub fn shutdown(&self) {
        self.live.lock().take();
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), AdapterError> {
        let mut state = self.state.write();
        if state.offline {
            return Err(AdapterError::Unavailable("ledger offline".into()));
        }
        if state.failures > 0 {
            state.failures -= 1;
            return Err(AdapterError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventLog for InMemoryLedger {
    async fn fetch_events(&self, kind: EventKind, from: Cursor, limit: usize) -> Result<Vec<LogEntry>, AdapterError> {
        self.check_available()?;

        let state = self.state.read();
        let start = state.entries.partition_point(|entry| entry.cursor < from);
        Ok(state.entries[start..]
            .iter()
            .filter(|entry| entry.event.kind() == kind)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn subscribe_live(&self, kind: EventKind) -> Result<LiveFeed, AdapterError> {
        self.check_available()?;

        let rx = match self.live.lock().as_ref() {
            Some(live) => live.subscribe(),
            None => return Err(AdapterError::Closed),
        };

        let feed = stream::unfold(Some(rx), move |rx| async move {
            let mut rx = rx?;
            loop {
                match rx.recv().await {
                    Ok(entry) if entry.event.kind() == kind => return Some((Ok(entry), Some(rx))),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        let err = AdapterError::Unavailable(format!("live feed lagged by {} entries", missed));
                        return Some((Err(err), Some(rx)));
                    }
                    Err(broadcast::error::RecvError::Closed) => return Some((Err(AdapterError::Closed), None)),
                }
            }
        });

        Ok(feed.boxed())
    }
}

#[async_trait]
impl PropertySource for InMemoryLedger {
    async fn read_property(&self, property: &Property) -> Result<Value, AdapterError> {
        self.check_available()?;

        self.state
            .read()
            .properties
            .get(property)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(property.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paid(trade_id: u64) -> EscrowEvent {
        EscrowEvent::Paid { trade_id, buyer: "B".into() }
    }

    fn funded(trade_id: u64) -> EscrowEvent {
        EscrowEvent::Funded { trade_id, seller: "S".into(), value: 110, fee: 10 }
    }

    #[tokio::test]
    async fn fetch_is_inclusive_and_filtered_by_kind() {
        let ledger = InMemoryLedger::new();
        let cursors = ledger.close_ledger(vec![paid(0), funded(1), paid(2)]);
        ledger.append(paid(3));

        let all = ledger.fetch_events(EventKind::Paid, Cursor::ORIGIN, 10).await.unwrap();
        assert_eq!(all.iter().map(|e| e.event.trade_id()).collect::<Vec<_>>(), vec![0, 2, 3]);

        let from_second = ledger.fetch_events(EventKind::Paid, cursors[2], 10).await.unwrap();
        assert_eq!(from_second[0].cursor, cursors[2]);
        assert_eq!(from_second.len(), 2);

        let limited = ledger.fetch_events(EventKind::Paid, Cursor::ORIGIN, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let ledger = InMemoryLedger::new();
        ledger.fail_next(2);

        assert!(matches!(ledger.read_property(&Property::Trade(0)).await, Err(AdapterError::Unavailable(_))));
        assert!(matches!(ledger.fetch_events(EventKind::Paid, Cursor::ORIGIN, 1).await, Err(AdapterError::Unavailable(_))));
        assert_eq!(ledger.read_property(&Property::Trade(0)).await, Err(AdapterError::NotFound("trade/0".into())));

        ledger.set_property(Property::Trade(0), json!({"status": "Created"}));
        assert_eq!(ledger.read_property(&Property::Trade(0)).await, Ok(json!({"status": "Created"})));
    }

    #[tokio::test]
    async fn live_feed_redelivers_and_closes() {
        let ledger = InMemoryLedger::new();
        let mut feed = ledger.subscribe_live(EventKind::Paid).await.unwrap();

        ledger.set_redelivery(true);
        ledger.append(funded(0));
        let cursor = ledger.append(paid(0));

        assert_eq!(feed.next().await.unwrap().unwrap().cursor, cursor);
        assert_eq!(feed.next().await.unwrap().unwrap().cursor, cursor);

        ledger.shutdown();
        assert_eq!(feed.next().await, Some(Err(AdapterError::Closed)));
        assert!(feed.next().await.is_none());
        assert!(matches!(ledger.subscribe_live(EventKind::Paid).await, Err(AdapterError::Closed)));
    }
}
