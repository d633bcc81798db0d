//! Off-chain synchronizer for the P2P escrow contracts.
//!
//! Turns the escrow's event log and contract state into async streams:
//! - `Tracker::track_event` replays and follows events of one kind
//! - `Tracker::track_property` emits a piece of contract state on change
//! - `combinators` reshape tracked streams; `views` holds derived views
//!
//! Ledgers plug in through the `EventLog` and `PropertySource` traits;
//! `InMemoryLedger` implements both.

pub mod adapter;
pub mod combinators;
pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod state;
pub mod tracker;
pub mod views;

pub use adapter::{EventLog, LiveFeed, Property, PropertySource};
pub use combinators::{merge, merge_map, scan_snapshots};
pub use config::TrackerConfig;
pub use error::{AdapterError, Result, TrackerError};
pub use events::{
    Arbitration, Cursor, EscrowEvent, EventFilter, EventKind, LogEntry, OfferRecord, TradeRecord, TradeStatus, UserRecord,
};
pub use memory::InMemoryLedger;
pub use state::SubscriptionState;
pub use tracker::{Tracked, Tracker};
pub use views::{account_trades, AccountTrade};
