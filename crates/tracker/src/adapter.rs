//! Ledger access traits - implemented by RPC clients and the in-memory ledger

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::AdapterError;
use crate::events::{Cursor, EscrowEvent, EventKind, LogEntry};

/// Entries appended after the subscription started, in ledger order.
/// Delivery is at least once.
pub type LiveFeed = BoxStream<'static, Result<LogEntry, AdapterError>>;

/// Historical and live access to the escrow's event log
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Entries of `kind` at or after `from`, ascending, at most `limit`.
    async fn fetch_events(&self, kind: EventKind, from: Cursor, limit: usize) -> Result<Vec<LogEntry>, AdapterError>;

    /// Live feed of entries of `kind`.
    async fn subscribe_live(&self, kind: EventKind) -> Result<LiveFeed, AdapterError>;
}

/// Read access to contract state
#[async_trait]
pub trait PropertySource: Send + Sync {
    /// Current value of `property`, in its JSON encoding.
    async fn read_property(&self, property: &Property) -> Result<Value, AdapterError>;
}

/// Piece of contract state a client can watch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    /// Trade record by id
    Trade(u64),
    /// Offer by id
    Offer(u64),
    /// User record by account address
    User(String),
}

impl Property {
    /// Event kinds that can change this property.
    pub fn notify_kinds(&self) -> &'static [EventKind] {
        match self {
            Property::Trade(_) => &EventKind::ALL,
            Property::User(_) => &[EventKind::Created],
            // Offers are immutable
            Property::Offer(_) => &[],
        }
    }

    /// Whether `event` may have changed this property.
    pub fn affected_by(&self, event: &EscrowEvent) -> bool {
        match (self, event) {
            (Property::Trade(id), event) => event.trade_id() == *id,
            (Property::User(account), EscrowEvent::Created { buyer, .. }) => buyer == account,
            _ => false,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Trade(id) => write!(f, "trade/{}", id),
            Property::Offer(id) => write!(f, "offer/{}", id),
            Property::User(account) => write!(f, "user/{}", account),
        }
    }
}
