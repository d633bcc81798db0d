//! Off-chain mirror of the escrow contract's events and of the trade, offer
//! and user records.
//!
//! Addresses travel as their string encoding. Amounts are `i128` like on
//! chain.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Position of an entry in the ledger: ledger sequence, then index of the
/// event within that ledger. Totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Cursor {
    pub ledger: u32,
    pub index: u32,
}

impl Cursor {
    /// Position before every entry
    pub const ORIGIN: Cursor = Cursor { ledger: 0, index: 0 };

    pub fn new(ledger: u32, index: u32) -> Self {
        Self { ledger, index }
    }

    /// Smallest cursor strictly after this one.
    pub fn successor(self) -> Self {
        match self.index.checked_add(1) {
            Some(index) => Self { ledger: self.ledger, index },
            None => Self { ledger: self.ledger.saturating_add(1), index: 0 },
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ledger, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Funded,
    Paid,
    Released,
    Canceled,
    Disputed,
    Resolved,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Created,
        EventKind::Funded,
        EventKind::Paid,
        EventKind::Released,
        EventKind::Canceled,
        EventKind::Disputed,
        EventKind::Resolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Funded => "funded",
            EventKind::Paid => "paid",
            EventKind::Released => "released",
            EventKind::Canceled => "canceled",
            EventKind::Disputed => "disputed",
            EventKind::Resolved => "resolved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded escrow event. Field names match the contract's event layouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscrowEvent {
    Created { buyer: String, seller: String, trade_id: u64, offer_id: u64, amount: i128 },
    Funded { trade_id: u64, seller: String, value: i128, fee: i128 },
    Paid { trade_id: u64, buyer: String },
    Released { trade_id: u64, buyer: String, amount: i128, fee: i128 },
    Canceled { trade_id: u64, caller: String, refund: i128 },
    Disputed { trade_id: u64, caller: String, arbitrator: String },
    Resolved { trade_id: u64, arbitrator: String, favor_buyer: bool },
}

impl EscrowEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EscrowEvent::Created { .. } => EventKind::Created,
            EscrowEvent::Funded { .. } => EventKind::Funded,
            EscrowEvent::Paid { .. } => EventKind::Paid,
            EscrowEvent::Released { .. } => EventKind::Released,
            EscrowEvent::Canceled { .. } => EventKind::Canceled,
            EscrowEvent::Disputed { .. } => EventKind::Disputed,
            EscrowEvent::Resolved { .. } => EventKind::Resolved,
        }
    }

    pub fn trade_id(&self) -> u64 {
        match self {
            EscrowEvent::Created { trade_id, .. }
            | EscrowEvent::Funded { trade_id, .. }
            | EscrowEvent::Paid { trade_id, .. }
            | EscrowEvent::Released { trade_id, .. }
            | EscrowEvent::Canceled { trade_id, .. }
            | EscrowEvent::Disputed { trade_id, .. }
            | EscrowEvent::Resolved { trade_id, .. } => *trade_id,
        }
    }

    /// Value of a named field, as JSON. `None` when the event has no such field.
    pub fn field(&self, name: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut fields)) => fields.remove(name),
            _ => None,
        }
    }
}

/// One event as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub cursor: Cursor,
    pub event: EscrowEvent,
}

/// Field name to required value. An empty filter matches every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    fields: BTreeMap<String, Value>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, event: &EscrowEvent) -> bool {
        if self.fields.is_empty() {
            return true;
        }
        let encoded = match serde_json::to_value(event) {
            Ok(Value::Object(fields)) => fields,
            _ => return false,
        };
        self.fields.iter().all(|(name, required)| encoded.get(name) == Some(required))
    }
}

// Contract state mirrors. Keys and hashes travel as lowercase hex.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Created,
    Funded,
    Paid,
    Released,
    Canceled,
    Disputed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arbitration {
    None,
    Open,
    FavoredBuyer,
    FavoredSeller,
}

/// Trade as returned by the escrow's `get_trade`. The id is not part of the
/// record; it is the key of `Property::Trade`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub offer_id: u64,
    pub buyer: String,
    pub seller: String,
    pub arbitrator: String,
    pub asset: String,
    pub amount: i128,
    pub fee: i128,
    pub escrowed: i128,
    pub status: TradeStatus,
    pub arbitration: Arbitration,
    pub created_at: u64,
    pub expires_at: u64,
    pub buyer_key: String,
    pub location: String,
    pub identity_hash: String,
}

/// Offer as returned by the metadata store's `offer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRecord {
    pub owner: String,
    pub asset: String,
    pub currency: String,
    pub payment_method: String,
    pub margin: i32,
    pub arbitrator: String,
    pub buyer_key: String,
    pub seller_key: String,
}

/// User record as returned by the metadata store's `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub location: String,
    pub identity_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn created(buyer: &str, seller: &str, trade_id: u64) -> EscrowEvent {
        EscrowEvent::Created {
            buyer: buyer.to_string(),
            seller: seller.to_string(),
            trade_id,
            offer_id: 0,
            amount: 1_000_000,
        }
    }

    #[test]
    fn cursor_orders_by_ledger_then_index() {
        assert!(Cursor::new(1, 9) < Cursor::new(2, 0));
        assert!(Cursor::new(2, 0) < Cursor::new(2, 1));
        assert_eq!(Cursor::new(3, 4).successor(), Cursor::new(3, 5));
        assert_eq!(Cursor::new(3, u32::MAX).successor(), Cursor::new(4, 0));
    }

    #[test]
    fn event_encoding_is_tagged_by_kind() {
        let value = serde_json::to_value(created("B", "S", 7)).unwrap();
        assert_eq!(value["kind"], json!("created"));
        assert_eq!(value["trade_id"], json!(7));
        assert_eq!(created("B", "S", 7).kind(), EventKind::Created);
    }

    #[test]
    fn field_lookup() {
        let event = created("B", "S", 7);
        assert_eq!(event.field("seller"), Some(json!("S")));
        assert_eq!(event.field("refund"), None);
    }

    #[test]
    fn filter_requires_every_field() {
        let event = created("B", "S", 7);
        assert!(EventFilter::new().matches(&event));
        assert!(EventFilter::new().with("seller", "S").matches(&event));
        assert!(EventFilter::new().with("seller", "S").with("trade_id", 7).matches(&event));
        assert!(!EventFilter::new().with("seller", "S").with("trade_id", 8).matches(&event));
        assert!(!EventFilter::new().with("caller", "S").matches(&event));
    }
}
