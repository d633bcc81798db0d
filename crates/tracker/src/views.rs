//! Derived views built from tracked streams

use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::adapter::{EventLog, Property, PropertySource};
use crate::combinators::{merge, merge_map, scan_snapshots};
use crate::error::{Result, TrackerError};
use crate::events::{Cursor, EventFilter, EventKind, OfferRecord, TradeRecord, UserRecord};
use crate::tracker::Tracker;

/// Trade seen from one account, with the offer it was created from and the
/// parties' user records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTrade {
    pub trade_id: u64,
    /// Whether the account is the buyer. Otherwise it is the seller.
    pub is_buyer: bool,
    pub trade: TradeRecord,
    pub offer: OfferRecord,
    /// User records exist once the account has bought through the escrow
    pub seller_info: Option<UserRecord>,
    pub buyer_info: Option<UserRecord>,
}

/// All trades `account` takes part in, as seller or as buyer.
///
/// Follows `created` events for both sides from `from`, reads each new trade
/// with its offer and user records, and yields the accumulated list, ordered
/// by trade id, after every trade found. Reads are retried like the event
/// streams, so a short outage delays a trade instead of dropping it.
pub fn account_trades<L>(tracker: &Tracker<L>, account: &str, from: Cursor) -> impl Stream<Item = Result<Vec<AccountTrade>>>
where
    L: EventLog + PropertySource + 'static,
{
    let as_seller = tracker
        .track_event(EventKind::Created, EventFilter::new().with("seller", account), from)
        .map(|entry| entry.map(|entry| (entry.event.trade_id(), false)))
        .boxed();
    let as_buyer = tracker
        .track_event(EventKind::Created, EventFilter::new().with("buyer", account), from)
        .map(|entry| entry.map(|entry| (entry.event.trade_id(), true)))
        .boxed();

    let reader = tracker.clone();
    let trades = merge_map(merge([as_seller, as_buyer]), tracker.config().fetch_concurrency, move |(trade_id, is_buyer)| {
        let reader = reader.clone();
        async move { enrich(&reader, trade_id, is_buyer).await }
    });

    scan_snapshots(trades, Vec::new(), |known: &mut Vec<AccountTrade>, trade| {
        match known.binary_search_by_key(&trade.trade_id, |t| t.trade_id) {
            Ok(position) => known[position] = trade,
            Err(position) => known.insert(position, trade),
        }
    })
}

async fn enrich<L>(tracker: &Tracker<L>, trade_id: u64, is_buyer: bool) -> Result<AccountTrade>
where
    L: EventLog + PropertySource + 'static,
{
    let trade: TradeRecord = tracker.read_with_retry(&Property::Trade(trade_id)).await?;
    let offer: OfferRecord = tracker.read_with_retry(&Property::Offer(trade.offer_id)).await?;
    let (seller_info, buyer_info) = futures::try_join!(
        read_optional::<UserRecord, _>(tracker, Property::User(trade.seller.clone())),
        read_optional::<UserRecord, _>(tracker, Property::User(trade.buyer.clone())),
    )?;

    Ok(AccountTrade { trade_id, is_buyer, trade, offer, seller_info, buyer_info })
}

async fn read_optional<T, L>(tracker: &Tracker<L>, property: Property) -> Result<Option<T>>
where
    T: DeserializeOwned,
    L: EventLog + PropertySource + 'static,
{
    match tracker.read_with_retry(&property).await {
        Ok(value) => Ok(Some(value)),
        Err(TrackerError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}
