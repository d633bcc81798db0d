use std::sync::Arc;
use std::time::Duration;

use escrow_tracker::{
    account_trades, AccountTrade, Arbitration, Cursor, EscrowEvent, EventFilter, EventKind, InMemoryLedger, LogEntry,
    OfferRecord, Property, Tracked, Tracker, TrackerConfig, TrackerError, TradeRecord, TradeStatus, UserRecord,
};
use futures::{Stream, StreamExt};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> TrackerConfig {
    TrackerConfig {
        poll_interval_ms: 20,
        page_size: 2,
        max_retries: 3,
        retry_backoff_ms: 5,
        max_backoff_ms: 20,
        ..Default::default()
    }
}

fn setup() -> (Arc<InMemoryLedger>, Tracker<InMemoryLedger>) {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new());
    let tracker = Tracker::new(ledger.clone(), fast_config());
    (ledger, tracker)
}

fn created(trade_id: u64, buyer: &str, seller: &str) -> EscrowEvent {
    EscrowEvent::Created {
        buyer: buyer.to_string(),
        seller: seller.to_string(),
        trade_id,
        offer_id: 0,
        amount: 1_000_000,
    }
}

fn trade(buyer: &str, seller: &str, status: TradeStatus) -> TradeRecord {
    TradeRecord {
        offer_id: 0,
        buyer: buyer.to_string(),
        seller: seller.to_string(),
        arbitrator: "ARBITRATOR".to_string(),
        asset: "ASSET".to_string(),
        amount: 1_000_000,
        fee: 0,
        escrowed: 0,
        status,
        arbitration: Arbitration::None,
        created_at: 0,
        expires_at: 3_600,
        buyer_key: "aa".repeat(32),
        location: "Lisbon".to_string(),
        identity_hash: "00".repeat(32),
    }
}

fn offer(owner: &str) -> OfferRecord {
    OfferRecord {
        owner: owner.to_string(),
        asset: "ASSET".to_string(),
        currency: "EUR".to_string(),
        payment_method: "SEPA".to_string(),
        margin: 0,
        arbitrator: "ARBITRATOR".to_string(),
        buyer_key: "aa".repeat(32),
        seller_key: "bb".repeat(32),
    }
}

fn user(username: &str) -> UserRecord {
    UserRecord { username: username.to_string(), location: "Lisbon".to_string(), identity_key: "cc".repeat(32) }
}

/// Stores a trade, created from offer 0, and closes a ledger with its
/// `created` event.
fn open_trade(ledger: &InMemoryLedger, trade_id: u64, buyer: &str, seller: &str) {
    ledger.put_trade(trade_id, &trade(buyer, seller, TradeStatus::Created)).unwrap();
    ledger.append(created(trade_id, buyer, seller));
}

/// Next item, failing the test if none arrives in time.
async fn next_item<S: Stream + Unpin>(stream: &mut S) -> Option<S::Item> {
    tokio::time::timeout(WAIT, stream.next()).await.expect("timed out waiting for the stream")
}

/// Asserts the stream stays silent for a while.
async fn assert_quiet<S: Stream + Unpin>(stream: &mut S)
where
    S::Item: std::fmt::Debug,
{
    if let Ok(item) = tokio::time::timeout(QUIET, stream.next()).await {
        panic!("unexpected item: {:?}", item);
    }
}

fn trade_ids(entries: &[LogEntry]) -> Vec<u64> {
    entries.iter().map(|entry| entry.event.trade_id()).collect()
}

#[tokio::test]
async fn replays_history_then_follows_live() {
    let (ledger, tracker) = setup();
    ledger.close_ledger(vec![created(0, "B", "S"), created(1, "B", "S"), created(2, "B", "S")]);
    ledger.append(EscrowEvent::Paid { trade_id: 0, buyer: "B".into() });
    ledger.append(created(3, "B", "S"));

    let mut stream = tracker.track_event(EventKind::Created, EventFilter::new(), Cursor::ORIGIN);

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(next_item(&mut stream).await.unwrap().unwrap());
    }
    assert_eq!(trade_ids(&seen), vec![0, 1, 2, 3]);
    assert!(seen.windows(2).all(|pair| pair[0].cursor < pair[1].cursor));

    ledger.set_redelivery(true);
    ledger.append(created(4, "B", "S"));
    let live = next_item(&mut stream).await.unwrap().unwrap();
    assert_eq!(live.event.trade_id(), 4);
    assert_quiet(&mut stream).await;
}

#[tokio::test]
async fn starts_at_the_given_cursor_and_filters() {
    let (ledger, tracker) = setup();
    ledger.append(created(0, "U", "S"));
    let start = ledger.append(created(1, "B", "S"));
    ledger.append(created(2, "U", "S"));
    ledger.append(created(3, "B", "U"));

    let filter = EventFilter::new().with("buyer", "U");
    let mut stream = tracker.track_event(EventKind::Created, filter, start);

    let entry = next_item(&mut stream).await.unwrap().unwrap();
    assert_eq!(entry.event.trade_id(), 2);
    assert_quiet(&mut stream).await;
}

#[tokio::test]
async fn account_view_accumulates_both_sides_once() {
    let (ledger, tracker) = setup();
    ledger.put(Property::Offer(0), &offer("S")).unwrap();
    ledger.put(Property::User("U".into()), &user("u")).unwrap();
    ledger.put(Property::User("X".into()), &user("x")).unwrap();
    ledger.put_trade(0, &trade("X", "U", TradeStatus::Created)).unwrap();
    ledger.put_trade(1, &trade("U", "Y", TradeStatus::Created)).unwrap();
    ledger.put_trade(2, &trade("X", "Y", TradeStatus::Created)).unwrap();
    ledger.close_ledger(vec![created(0, "X", "U"), created(1, "U", "Y"), created(2, "X", "Y")]);

    let mut view = Box::pin(account_trades(&tracker, "U", Cursor::ORIGIN));

    let first = next_item(&mut view).await.unwrap().unwrap();
    assert_eq!(first.len(), 1);
    let second = next_item(&mut view).await.unwrap().unwrap();
    assert_eq!(second.iter().map(|t| t.trade_id).collect::<Vec<_>>(), vec![0, 1]);

    let as_seller = &second[0];
    assert!(!as_seller.is_buyer);
    assert_eq!(as_seller.trade.seller, "U");
    assert_eq!(as_seller.offer, offer("S"));
    assert_eq!(as_seller.seller_info, Some(user("u")));
    assert_eq!(as_seller.buyer_info, Some(user("x")));

    let as_buyer = &second[1];
    assert!(as_buyer.is_buyer);
    assert_eq!(as_buyer.seller_info, None);
    assert_eq!(as_buyer.buyer_info, Some(user("u")));

    ledger.set_redelivery(true);
    open_trade(&ledger, 3, "Z", "U");

    let third = next_item(&mut view).await.unwrap().unwrap();
    assert_eq!(third.iter().map(|t| t.trade_id).collect::<Vec<_>>(), vec![0, 1, 3]);
    assert_quiet(&mut view).await;
}

#[tokio::test]
async fn account_view_keeps_trades_read_during_an_outage() {
    let (ledger, tracker) = setup();
    ledger.put(Property::Offer(0), &offer("S")).unwrap();
    open_trade(&ledger, 0, "U", "S");

    let mut view = Box::pin(account_trades(&tracker, "U", Cursor::ORIGIN));
    let first: Vec<AccountTrade> = next_item(&mut view).await.unwrap().unwrap();
    assert_eq!(first.len(), 1);

    ledger.fail_next(1);
    open_trade(&ledger, 1, "U", "S");

    let second = next_item(&mut view).await.unwrap().unwrap();
    assert_eq!(second.iter().map(|t| t.trade_id).collect::<Vec<_>>(), vec![0, 1]);
    assert!(second.iter().all(|t| t.is_buyer));
}

#[tokio::test]
async fn account_view_reports_an_outage_past_the_retry_budget() {
    let (ledger, tracker) = setup();
    ledger.put(Property::Offer(0), &offer("S")).unwrap();

    let mut view = Box::pin(account_trades(&tracker, "U", Cursor::ORIGIN));
    assert_quiet(&mut view).await;

    ledger.fail_next(4);
    open_trade(&ledger, 0, "U", "S");

    match next_item(&mut view).await {
        Some(Err(TrackerError::AdapterUnavailable { attempts, .. })) => assert_eq!(attempts, 4),
        other => panic!("expected AdapterUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn property_emits_only_changes() {
    let (ledger, tracker) = setup();
    ledger.put_trade(0, &trade("B", "S", TradeStatus::Created)).unwrap();

    let mut status = tracker.track_property::<TradeRecord>(Property::Trade(0)).map(|r| r.map(|t| t.status));
    assert_eq!(next_item(&mut status).await, Some(Ok(TradeStatus::Created)));

    // Notification without a change in the record
    ledger.append(EscrowEvent::Disputed { trade_id: 7, caller: "B".into(), arbitrator: "A".into() });
    ledger.put_trade(0, &trade("B", "S", TradeStatus::Created)).unwrap();
    ledger.append(EscrowEvent::Paid { trade_id: 0, buyer: "B".into() });
    assert_quiet(&mut status).await;

    ledger.put_trade(0, &trade("B", "S", TradeStatus::Funded)).unwrap();
    ledger.append(EscrowEvent::Funded { trade_id: 0, seller: "S".into(), value: 1_100_000, fee: 100_000 });
    assert_eq!(next_item(&mut status).await, Some(Ok(TradeStatus::Funded)));

    ledger.put_trade(0, &trade("B", "S", TradeStatus::Paid)).unwrap();
    assert_eq!(next_item(&mut status).await, Some(Ok(TradeStatus::Paid)));
    assert_quiet(&mut status).await;
}

#[tokio::test]
async fn missing_property_ends_with_not_found() {
    let (_ledger, tracker) = setup();

    let mut stream = tracker.track_property::<TradeRecord>(Property::Trade(9));
    assert_eq!(next_item(&mut stream).await, Some(Err(TrackerError::NotFound("trade/9".into()))));
    assert_eq!(next_item(&mut stream).await, None);
}

#[tokio::test]
async fn undecodable_property_ends_with_decode_error() {
    let (ledger, tracker) = setup();
    ledger.set_property(Property::Trade(0), serde_json::json!({"status": "Lost"}));

    let mut stream = tracker.track_property::<TradeRecord>(Property::Trade(0));
    assert!(matches!(next_item(&mut stream).await, Some(Err(TrackerError::Decode(_)))));
    assert_eq!(next_item(&mut stream).await, None);
}

#[tokio::test]
async fn survives_transient_outage() {
    let (ledger, tracker) = setup();
    ledger.close_ledger(vec![created(0, "B", "S"), created(1, "B", "S"), created(2, "B", "S")]);
    ledger.fail_next(3);

    let mut stream = tracker.track_event(EventKind::Created, EventFilter::new(), Cursor::ORIGIN);
    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(next_item(&mut stream).await.unwrap().unwrap());
    }
    assert_eq!(trade_ids(&seen), vec![0, 1, 2]);
}

#[tokio::test]
async fn gives_up_after_retry_budget() {
    let (ledger, tracker) = setup();
    ledger.set_offline(true);

    let mut stream = tracker.track_event(EventKind::Created, EventFilter::new(), Cursor::ORIGIN);

    match next_item(&mut stream).await {
        Some(Err(TrackerError::AdapterUnavailable { attempts, .. })) => assert_eq!(attempts, 4),
        other => panic!("expected AdapterUnavailable, got {:?}", other),
    }
    assert_eq!(next_item(&mut stream).await, None);
}

#[tokio::test]
async fn cancel_stops_delivery() {
    let (ledger, tracker) = setup();
    ledger.append(created(0, "B", "S"));

    let mut stream: Tracked<LogEntry> = tracker.track_event(EventKind::Created, EventFilter::new(), Cursor::ORIGIN);
    assert_eq!(next_item(&mut stream).await.unwrap().unwrap().event.trade_id(), 0);

    stream.cancel();
    stream.cancel();
    ledger.append(created(1, "B", "S"));

    assert!(stream.is_cancelled());
    assert_eq!(next_item(&mut stream).await, None);
}

#[tokio::test]
async fn closed_feed_cancels_subscription() {
    let (ledger, tracker) = setup();
    ledger.append(created(0, "B", "S"));

    let mut stream = tracker.track_event(EventKind::Created, EventFilter::new(), Cursor::ORIGIN);
    assert!(next_item(&mut stream).await.unwrap().is_ok());

    ledger.shutdown();
    assert!(matches!(next_item(&mut stream).await, Some(Err(TrackerError::SubscriptionCancelled(_)))));
    assert_eq!(next_item(&mut stream).await, None);
}

#[tokio::test]
async fn one_shot_read() {
    let (ledger, tracker) = setup();
    ledger.put_trade(5, &trade("B", "S", TradeStatus::Released)).unwrap();

    let record: TradeRecord = tracker.read(&Property::Trade(5)).await.unwrap();
    assert_eq!(record.status, TradeStatus::Released);

    let missing = tracker.read::<TradeRecord>(&Property::Trade(6)).await;
    assert_eq!(missing, Err(TrackerError::NotFound("trade/6".into())));
}

#[tokio::test]
async fn read_with_retry_rides_out_failures() {
    let (ledger, tracker) = setup();
    ledger.put_trade(5, &trade("B", "S", TradeStatus::Paid)).unwrap();

    ledger.fail_next(3);
    let record: TradeRecord = tracker.read_with_retry(&Property::Trade(5)).await.unwrap();
    assert_eq!(record.status, TradeStatus::Paid);

    ledger.fail_next(4);
    match tracker.read_with_retry::<TradeRecord>(&Property::Trade(5)).await {
        Err(TrackerError::AdapterUnavailable { attempts, reason }) => {
            assert_eq!(attempts, 4);
            assert_eq!(reason, "injected failure");
        }
        other => panic!("expected AdapterUnavailable, got {:?}", other),
    }

    let missing = tracker.read_with_retry::<TradeRecord>(&Property::Trade(6)).await;
    assert_eq!(missing, Err(TrackerError::NotFound("trade/6".into())));
}
