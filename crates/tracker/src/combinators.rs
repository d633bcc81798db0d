//! Combinators over tracked streams.
//!
//! Errors pass through unchanged: only `Ok` items are mapped, expanded or
//! folded. Plain per-item mapping is `StreamExt::map`.

use futures::future::{self, Either};
use futures::stream::{self, Stream, StreamExt};
use std::future::Future;

use crate::error::Result;

/// Interleaves several streams in arrival order. Ends when all of them end.
pub fn merge<S>(streams: impl IntoIterator<Item = S>) -> impl Stream<Item = S::Item>
where
    S: Stream + Unpin,
{
    stream::select_all(streams)
}

/// Runs `f` on every `Ok` item with at most `concurrency` calls in flight and
/// yields results in completion order.
pub fn merge_map<S, T, U, F, Fut>(input: S, concurrency: usize, mut f: F) -> impl Stream<Item = Result<U>>
where
    S: Stream<Item = Result<T>>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<U>>,
{
    input
        .map(move |item| match item {
            Ok(value) => Either::Left(f(value)),
            Err(err) => Either::Right(future::ready(Err(err))),
        })
        .buffer_unordered(concurrency.max(1))
}

/// Left fold that yields the accumulator after every `Ok` item.
pub fn scan_snapshots<S, T, A, F>(input: S, init: A, mut f: F) -> impl Stream<Item = Result<A>>
where
    S: Stream<Item = Result<T>>,
    A: Clone,
    F: FnMut(&mut A, T),
{
    input.scan(init, move |acc, item| {
        let snapshot = item.map(|value| {
            f(acc, value);
            acc.clone()
        });
        future::ready(Some(snapshot))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use std::time::Duration;

    #[tokio::test]
    async fn merge_yields_everything() {
        let left = stream::iter(vec![1, 3, 5]);
        let right = stream::iter(vec![2, 4]);

        let mut merged: Vec<i32> = merge(vec![left.boxed(), right.boxed()]).collect().await;
        merged.sort();
        assert_eq!(merged, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn merge_map_completes_out_of_order() {
        let input = stream::iter(vec![Ok(30u64), Ok(1), Err(TrackerError::NotFound("x".into()))]);

        let results: Vec<Result<u64>> = merge_map(input, 3, |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(delay * 2)
        })
        .collect()
        .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results.last(), Some(&Ok(60)));
        assert!(results.contains(&Ok(2)));
        assert!(results.contains(&Err(TrackerError::NotFound("x".into()))));
    }

    #[tokio::test]
    async fn scan_emits_running_snapshots() {
        let input = stream::iter(vec![Ok(1), Err(TrackerError::Decode("bad".into())), Ok(2), Ok(3)]);

        let snapshots: Vec<Result<Vec<i32>>> = scan_snapshots(input, Vec::new(), |acc, v| acc.push(v)).collect().await;

        assert_eq!(
            snapshots,
            vec![
                Ok(vec![1]),
                Err(TrackerError::Decode("bad".into())),
                Ok(vec![1, 2]),
                Ok(vec![1, 2, 3]),
            ]
        );
    }
}
