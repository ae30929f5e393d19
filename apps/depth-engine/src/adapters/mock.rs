//! Mock venue adapter for tests and demos.
//!
//! Outcomes are scripted: each `fetch` pops the next queued snapshot or
//! failure. When the script runs dry the adapter serves its default
//! snapshot, or a network error if none is set.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::adapters::VenueAdapter;
use crate::error::FeedError;
use crate::models::{OrderbookSnapshot, PriceLevel};

/// Programmable venue adapter.
#[derive(Debug)]
pub struct MockVenueAdapter {
    venue: String,
    symbol: String,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    script: VecDeque<Outcome>,
    default_snapshot: Option<OrderbookSnapshot>,
    calls: usize,
}

#[derive(Debug)]
enum Outcome {
    Snapshot(OrderbookSnapshot),
    Failure(FeedError),
}

impl MockVenueAdapter {
    /// Create a mock adapter for one venue and symbol.
    #[must_use]
    pub fn new(venue: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            symbol: symbol.into(),
            inner: Mutex::new(Inner {
                script: VecDeque::new(),
                default_snapshot: None,
                calls: 0,
            }),
        }
    }

    /// Queue a successful snapshot outcome.
    pub fn push_snapshot(&self, snapshot: OrderbookSnapshot) {
        self.inner.lock().script.push_back(Outcome::Snapshot(snapshot));
    }

    /// Queue a failure outcome.
    pub fn push_failure(&self, error: FeedError) {
        self.inner.lock().script.push_back(Outcome::Failure(error));
    }

    /// Serve this snapshot whenever the script is empty.
    pub fn set_default_snapshot(&self, snapshot: OrderbookSnapshot) {
        self.inner.lock().default_snapshot = Some(snapshot);
    }

    /// Number of `fetch` calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.inner.lock().calls
    }

    /// Build a symmetric book around `mid`: `levels` per side, one basis
    /// point apart, `quantity` at every level.
    #[must_use]
    pub fn snapshot_around(
        &self,
        mid: Decimal,
        levels: usize,
        quantity: Decimal,
    ) -> OrderbookSnapshot {
        let step = mid / Decimal::from(10_000u32);
        let timestamp = Utc::now();
        let bids = (1..=levels)
            .map(|i| PriceLevel::new(mid - step * Decimal::from(i), quantity, timestamp))
            .collect();
        let asks = (1..=levels)
            .map(|i| PriceLevel::new(mid + step * Decimal::from(i), quantity, timestamp))
            .collect();
        OrderbookSnapshot::new(&self.symbol, &self.venue, timestamp, bids, asks, None)
    }
}

#[async_trait]
impl VenueAdapter for MockVenueAdapter {
    fn venue(&self) -> &str {
        &self.venue
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn fetch(&self) -> Result<OrderbookSnapshot, FeedError> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        match inner.script.pop_front() {
            Some(Outcome::Snapshot(snapshot)) => Ok(snapshot),
            Some(Outcome::Failure(error)) => Err(error),
            None => inner
                .default_snapshot
                .clone()
                .ok_or_else(|| FeedError::Network("mock script exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[tokio::test]
    async fn script_outcomes_pop_in_order() {
        let adapter = MockVenueAdapter::new("mock", "BTC-USD");
        adapter.push_snapshot(adapter.snapshot_around(dec!(50000), 3, dec!(1)));
        adapter.push_failure(FeedError::EmptyBook);

        assert!(adapter.fetch().await.is_ok());
        assert!(matches!(adapter.fetch().await, Err(FeedError::EmptyBook)));
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_serves_default_or_errors() {
        let adapter = MockVenueAdapter::new("mock", "BTC-USD");
        assert!(matches!(adapter.fetch().await, Err(FeedError::Network(_))));

        adapter.set_default_snapshot(adapter.snapshot_around(dec!(100), 2, dec!(5)));
        let snapshot = adapter.fetch().await.unwrap();
        assert_eq!(snapshot.bids.len(), 2);
        assert_eq!(adapter.calls(), 2);
    }

    #[test]
    fn snapshot_builder_brackets_the_mid() {
        let adapter = MockVenueAdapter::new("mock", "BTC-USD");
        let snapshot = adapter.snapshot_around(dec!(50000), 5, dec!(2));

        assert_eq!(snapshot.bids.len(), 5);
        assert_eq!(snapshot.asks.len(), 5);
        assert_eq!(snapshot.mid_price(), Some(dec!(50000)));
        assert_eq!(snapshot.best_bid().unwrap().price, dec!(49995));
        assert_eq!(snapshot.best_ask().unwrap().price, dec!(50005));
        assert_eq!(snapshot.total_bid_quantity(), dec!(10));
    }
}
