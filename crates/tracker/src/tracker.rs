//! Reactive synchronizer
//!
//! Every tracked stream is backed by one tokio task feeding a bounded channel.
//! Event streams replay history from a cursor and then follow the live feed;
//! property streams re-read a piece of contract state on a timer and whenever a
//! relevant event arrives. Ledger outages are retried with exponential
//! backoff, resuming from the last cursor seen.

use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::adapter::{EventLog, Property, PropertySource};
use crate::config::TrackerConfig;
use crate::error::{AdapterError, Result, TrackerError};
use crate::events::{Cursor, EventFilter, EventKind, LogEntry};
use crate::state::SubscriptionState;

/// Entry point for tracked streams over one ledger.
pub struct Tracker<L> {
    ledger: Arc<L>,
    config: TrackerConfig,
}

impl<L> Clone for Tracker<L> {
    fn clone(&self) -> Self {
        Self { ledger: self.ledger.clone(), config: self.config.clone() }
    }
}

impl<L> Tracker<L> {
    pub fn new(ledger: Arc<L>, config: TrackerConfig) -> Self {
        Self { ledger, config }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

impl<L: EventLog + 'static> Tracker<L> {
    /// Streams every entry of `kind` at or after `from` whose event matches
    /// `filter`, then keeps following new entries.
    ///
    /// Entries arrive in cursor order, each at most once. After
    /// `max_retries` consecutive ledger failures the stream yields
    /// `AdapterUnavailable` and ends.
    ///
    /// Must be called from within a tokio runtime.
    pub fn track_event(&self, kind: EventKind, filter: EventFilter, from: Cursor) -> Tracked<LogEntry> {
        info!(%kind, %from, "tracking events");
        let follower = EventFollower {
            ledger: self.ledger.clone(),
            kind,
            filter,
            origin: from,
            state: SubscriptionState::new(self.config.dedup_window),
            config: self.config.clone(),
            failures: 0,
        };
        Tracked::spawn(self.config.channel_capacity, move |tx| follower.run(tx))
    }
}

impl<L: EventLog + PropertySource + 'static> Tracker<L> {
    /// Streams the value of `property` each time it changes.
    ///
    /// The property is read on every poll interval tick and on every live
    /// event that may affect it; a read equal to the last emitted value is
    /// dropped. The stream ends on cancellation, on a missing property, on a
    /// value that does not decode into `T`, or once the retry budget is spent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn track_property<T>(&self, property: Property) -> Tracked<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        info!(%property, "tracking property");
        let watcher = PropertyWatcher {
            ledger: self.ledger.clone(),
            property,
            state: SubscriptionState::new(1),
            config: self.config.clone(),
            failures: 0,
        };
        Tracked::spawn(self.config.channel_capacity, move |tx| watcher.run(tx))
    }

    /// Reads and decodes `property` once.
    pub async fn read<T: DeserializeOwned>(&self, property: &Property) -> Result<T> {
        let value = self.ledger.read_property(property).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Reads and decodes `property`, retrying while the ledger is
    /// unavailable. Gives up with `AdapterUnavailable` after `max_retries`
    /// consecutive failures.
    pub async fn read_with_retry<T: DeserializeOwned>(&self, property: &Property) -> Result<T> {
        let mut failures = 0;
        loop {
            let err = match self.ledger.read_property(property).await {
                Ok(value) => return Ok(serde_json::from_value(value)?),
                Err(err) => err,
            };

            match give_up(err, &mut failures, self.config.max_retries, "read") {
                None => {
                    let delay = self.config.backoff(failures);
                    warn!(%property, attempt = failures, ?delay, "read failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Some(terminal) => return Err(terminal),
            }
        }
    }
}

// ================================================================================================
// TRACKED STREAM
// ================================================================================================

/// Handle to a running subscription.
///
/// Yields `Ok` items until the subscription ends; a terminal failure is
/// yielded once as `Err` before the end. Cancelling or dropping the handle
/// stops the producer task and releases its live feeds.
pub struct Tracked<T> {
    rx: mpsc::Receiver<Result<T>>,
    task: JoinHandle<()>,
    cancelled: bool,
}

impl<T: Send + 'static> Tracked<T> {
    fn spawn<F>(capacity: usize, producer: impl FnOnce(mpsc::Sender<Result<T>>) -> F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(producer(tx));
        Self { rx, task, cancelled: false }
    }
}

impl<T> Tracked<T> {
    /// Stops the subscription. Idempotent; nothing is yielded afterwards.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.task.abort();
        self.rx.close();
        debug!("subscription cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<T> Unpin for Tracked<T> {}

impl<T> Stream for Tracked<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ================================================================================================
// PRODUCERS
// ================================================================================================

/// Maps a ledger failure to the error that ends a stream, or `None` when the
/// retry budget allows another attempt.
fn give_up(err: AdapterError, failures: &mut u32, max_retries: u32, what: &str) -> Option<TrackerError> {
    match err {
        AdapterError::Unavailable(reason) => {
            *failures += 1;
            if *failures > max_retries {
                Some(TrackerError::AdapterUnavailable { attempts: *failures, reason })
            } else {
                None
            }
        }
        AdapterError::NotFound(missing) => Some(TrackerError::NotFound(missing)),
        AdapterError::Closed => Some(TrackerError::SubscriptionCancelled(format!("{} feed closed", what))),
    }
}

struct EventFollower<L> {
    ledger: Arc<L>,
    kind: EventKind,
    filter: EventFilter,
    origin: Cursor,
    state: SubscriptionState,
    config: TrackerConfig,
    failures: u32,
}

impl<L: EventLog> EventFollower<L> {
    async fn run(mut self, tx: mpsc::Sender<Result<LogEntry>>) {
        loop {
            let err = match self.session(&tx).await {
                Ok(()) => {
                    debug!(kind = %self.kind, "consumer gone");
                    return;
                }
                Err(err) => err,
            };

            let what = self.kind.as_str();
            match give_up(err, &mut self.failures, self.config.max_retries, what) {
                None => {
                    let delay = self.config.backoff(self.failures);
                    warn!(kind = %self.kind, attempt = self.failures, ?delay, "ledger unavailable, retrying");
                    tokio::time::sleep(delay).await;
                }
                Some(terminal) => {
                    warn!(kind = %self.kind, error = %terminal, suppressed = self.state.suppressed(), "event stream ended");
                    let _ = tx.send(Err(terminal)).await;
                    return;
                }
            }
        }
    }

    /// Subscribes, replays up to the present, then follows the live feed.
    /// Returns `Ok` once the consumer is gone.
    async fn session(&mut self, tx: &mpsc::Sender<Result<LogEntry>>) -> std::result::Result<(), AdapterError> {
        // Subscribe before replaying so nothing falls between the two
        let mut live = self.ledger.subscribe_live(self.kind).await?;

        let mut next = self.state.resume_from(self.origin);
        loop {
            let page = self.ledger.fetch_events(self.kind, next, self.config.page_size).await?;
            let last_page = page.len() < self.config.page_size;
            for entry in page {
                next = next.max(entry.cursor.successor());
                if !self.deliver(entry, tx).await {
                    return Ok(());
                }
            }
            if last_page {
                break;
            }
        }

        self.failures = 0;
        debug!(kind = %self.kind, position = ?self.state.last_cursor(), "replay complete, following live feed");

        while let Some(item) = live.next().await {
            if !self.deliver(item?, tx).await {
                return Ok(());
            }
        }
        Err(AdapterError::Closed)
    }

    /// Returns false once the consumer is gone.
    async fn deliver(&mut self, entry: LogEntry, tx: &mpsc::Sender<Result<LogEntry>>) -> bool {
        if !self.state.admit(entry.cursor) {
            trace!(cursor = %entry.cursor, "duplicate dropped");
            return true;
        }
        if !self.filter.matches(&entry.event) {
            return true;
        }
        tx.send(Ok(entry)).await.is_ok()
    }
}

struct PropertyWatcher<L> {
    ledger: Arc<L>,
    property: Property,
    state: SubscriptionState,
    config: TrackerConfig,
    failures: u32,
}

impl<L: EventLog + PropertySource> PropertyWatcher<L> {
    async fn run<T: DeserializeOwned + Send>(mut self, tx: mpsc::Sender<Result<T>>) {
        loop {
            let err = match self.session(&tx).await {
                Ok(()) => return,
                Err(err) => err,
            };

            match give_up(err, &mut self.failures, self.config.max_retries, "notification") {
                None => {
                    let delay = self.config.backoff(self.failures);
                    warn!(property = %self.property, attempt = self.failures, ?delay, "ledger unavailable, retrying");
                    tokio::time::sleep(delay).await;
                }
                Some(terminal) => {
                    warn!(property = %self.property, error = %terminal, "property stream ended");
                    let _ = tx.send(Err(terminal)).await;
                    return;
                }
            }
        }
    }

    /// Returns `Ok` once the stream is finished: consumer gone or an
    /// undecodable value delivered as an error.
    async fn session<T: DeserializeOwned>(&mut self, tx: &mpsc::Sender<Result<T>>) -> std::result::Result<(), AdapterError> {
        let mut feeds = Vec::new();
        for kind in self.property.notify_kinds() {
            feeds.push(self.ledger.subscribe_live(*kind).await?);
        }
        let mut notifications = stream::select_all(feeds).chain(stream::pending()).boxed();

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                item = notifications.next() => match item {
                    Some(Ok(entry)) if self.property.affected_by(&entry.event) => {
                        trace!(property = %self.property, cursor = %entry.cursor, "notified");
                    }
                    Some(Ok(_)) | None => continue,
                    Some(Err(err)) => return Err(err),
                },
            }

            let value = self.ledger.read_property(&self.property).await?;
            self.failures = 0;

            if !self.state.value_changed(value.to_string()) {
                continue;
            }

            match serde_json::from_value::<T>(value) {
                Ok(decoded) => {
                    if tx.send(Ok(decoded)).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!(property = %self.property, error = %e, "undecodable property value");
                    let _ = tx.send(Err(TrackerError::Decode(e.to_string()))).await;
                    return Ok(());
                }
            }
        }
    }
}
