//! Canonical order book data model.
//!
//! Every venue-native payload is parsed immediately into these shapes;
//! nothing downstream ever sees venue-specific structure. Levels are
//! immutable once parsed; derived fields (running cumulative) are
//! populated on copies via [`OrderbookSnapshot::with_cumulative`], never
//! in place.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Sides and levels
// ============================================================================

/// Which side of the book a level or zone belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side, sorted descending by price.
    Bid,
    /// Sell side, sorted ascending by price.
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// One price level of an order book snapshot.
///
/// `price` and `quantity` are strictly positive for every parsed level;
/// adapters discard anything else before construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Quoted price.
    pub price: Decimal,
    /// Quoted quantity at this price.
    pub quantity: Decimal,
    /// Running cumulative quantity from the top of the side.
    ///
    /// `None` on freshly parsed levels; populated only on copies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative: Option<Decimal>,
    /// Number of resting orders at this level, where the venue reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_count: Option<u32>,
    /// When this level was observed.
    pub timestamp: DateTime<Utc>,
}

impl PriceLevel {
    /// Create a level with no derived fields.
    #[must_use]
    pub const fn new(price: Decimal, quantity: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            price,
            quantity,
            cumulative: None,
            order_count: None,
            timestamp,
        }
    }

    /// Attach an order count reported by the venue.
    #[must_use]
    pub const fn with_order_count(mut self, count: u32) -> Self {
        self.order_count = Some(count);
        self
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// A timestamped full set of bid/ask levels for one venue and symbol.
///
/// Invariant: `bids` strictly descending and `asks` strictly ascending by
/// price. [`OrderbookSnapshot::new`] sorts, so every constructed snapshot
/// satisfies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    /// Traded instrument, venue-agnostic spelling (e.g. `BTC-USD`).
    pub symbol: String,
    /// Venue identifier (e.g. `binance`).
    pub venue: String,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
    /// Buy side, descending by price.
    pub bids: Vec<PriceLevel>,
    /// Sell side, ascending by price.
    pub asks: Vec<PriceLevel>,
    /// Venue sequence number, where the venue provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl OrderbookSnapshot {
    /// Build a snapshot, sorting each side into canonical order.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        venue: impl Into<String>,
        timestamp: DateTime<Utc>,
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
        sequence: Option<u64>,
    ) -> Self {
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
            timestamp,
            bids,
            asks,
            sequence,
        }
    }

    /// Key identifying this snapshot's store.
    #[must_use]
    pub fn key(&self) -> BookKey {
        BookKey::new(&self.venue, &self.symbol)
    }

    /// Best (highest) bid level.
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best (lowest) ask level.
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Best-ask minus best-bid; `None` unless both sides are populated.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Midpoint between best bid and best ask.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Total quoted quantity on the bid side.
    #[must_use]
    pub fn total_bid_quantity(&self) -> Decimal {
        self.bids.iter().map(|l| l.quantity).sum()
    }

    /// Total quoted quantity on the ask side.
    #[must_use]
    pub fn total_ask_quantity(&self) -> Decimal {
        self.asks.iter().map(|l| l.quantity).sum()
    }

    /// Copy of this snapshot with running cumulative quantity populated
    /// per side, walking each side in its sorted order.
    ///
    /// The receiver is left untouched; levels are never mutated in place.
    #[must_use]
    pub fn with_cumulative(&self) -> Self {
        let mut copy = self.clone();
        let mut running = Decimal::ZERO;
        for level in &mut copy.bids {
            running += level.quantity;
            level.cumulative = Some(running);
        }
        running = Decimal::ZERO;
        for level in &mut copy.asks {
            running += level.quantity;
            level.cumulative = Some(running);
        }
        copy
    }
}

// ============================================================================
// Store key
// ============================================================================

/// Venue + symbol pair keying every per-book bounded store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookKey {
    /// Venue identifier.
    pub venue: String,
    /// Instrument symbol.
    pub symbol: String,
}

impl BookKey {
    /// Create a key.
    #[must_use]
    pub fn new(venue: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            symbol: symbol.into(),
        }
    }
}

impl std::fmt::Display for BookKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.venue, self.symbol)
    }
}

// ============================================================================
// Connection state and quality
// ============================================================================

/// Connection state of one venue, owned exclusively by the feed manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VenueConnectionState {
    /// No connection attempt has been made, or the venue was stopped.
    Disconnected,
    /// A connection or reconnection attempt is in flight.
    Connecting,
    /// Polling normally.
    Connected,
    /// Demoted after consecutive poll failures; reconnect may be pending.
    Failed,
}

impl std::fmt::Display for VenueConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Composite data-quality scores for one venue.
///
/// All score fields are in `[0, 1]`; `latency_ms` is the last observed
/// fetch round-trip in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityRecord {
    /// Last fetch round-trip latency, milliseconds.
    pub latency_ms: f64,
    /// Fraction of the expected book depth actually delivered.
    pub completeness: f64,
    /// Plausibility of quoted spreads relative to the acceptable band.
    pub accuracy: f64,
    /// Time-since-update score, decayed in discrete bands.
    pub freshness: f64,
    /// Success/failure track record; decays faster on failure.
    pub reliability: f64,
    /// Consecutive poll failures since the last success.
    pub consecutive_errors: u32,
}

impl Default for DataQualityRecord {
    fn default() -> Self {
        Self {
            latency_ms: 0.0,
            completeness: 0.0,
            accuracy: 1.0,
            freshness: 0.0,
            reliability: 1.0,
            consecutive_errors: 0,
        }
    }
}

impl DataQualityRecord {
    /// Composite quality score: mean of the four score components.
    #[must_use]
    pub fn score(&self) -> f64 {
        (self.completeness + self.accuracy + self.freshness + self.reliability) / 4.0
    }
}

/// Queryable aggregate of one venue's connection and quality state.
#[derive(Debug, Clone, Serialize)]
pub struct VenueStatus {
    /// Venue identifier.
    pub venue: String,
    /// Connection state machine position.
    pub state: VenueConnectionState,
    /// Quality scores as of the last poll or decay sweep.
    pub quality: DataQualityRecord,
    /// When the last validated snapshot arrived.
    pub last_update: Option<DateTime<Utc>>,
    /// Reconnect attempts made since the venue was last healthy.
    pub reconnect_attempts: u32,
    /// The circuit breaker tripped: no further automatic retry.
    pub permanently_failed: bool,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, quantity: Decimal) -> PriceLevel {
        PriceLevel::new(price, quantity, Utc::now())
    }

    #[test]
    fn constructor_sorts_bids_descending_and_asks_ascending() {
        let snapshot = OrderbookSnapshot::new(
            "BTC-USD",
            "test",
            Utc::now(),
            vec![
                level(dec!(100), dec!(1)),
                level(dec!(102), dec!(1)),
                level(dec!(101), dec!(1)),
            ],
            vec![
                level(dec!(105), dec!(1)),
                level(dec!(103), dec!(1)),
                level(dec!(104), dec!(1)),
            ],
            None,
        );

        let bid_prices: Vec<Decimal> = snapshot.bids.iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![dec!(102), dec!(101), dec!(100)]);

        let ask_prices: Vec<Decimal> = snapshot.asks.iter().map(|l| l.price).collect();
        assert_eq!(ask_prices, vec![dec!(103), dec!(104), dec!(105)]);
    }

    #[test]
    fn spread_and_mid_require_both_sides() {
        let ts = Utc::now();
        let snapshot = OrderbookSnapshot::new(
            "BTC-USD",
            "test",
            ts,
            vec![level(dec!(100), dec!(2))],
            vec![level(dec!(101), dec!(3))],
            None,
        );
        assert_eq!(snapshot.spread(), Some(dec!(1)));
        assert_eq!(snapshot.mid_price(), Some(dec!(100.5)));

        let one_sided =
            OrderbookSnapshot::new("BTC-USD", "test", ts, vec![level(dec!(100), dec!(2))], vec![], None);
        assert_eq!(one_sided.spread(), None);
        assert_eq!(one_sided.mid_price(), None);
    }

    #[test]
    fn with_cumulative_is_non_decreasing_and_totals_match() {
        let snapshot = OrderbookSnapshot::new(
            "BTC-USD",
            "test",
            Utc::now(),
            vec![
                level(dec!(102), dec!(1.5)),
                level(dec!(101), dec!(2.5)),
                level(dec!(100), dec!(1.0)),
            ],
            vec![level(dec!(103), dec!(4)), level(dec!(104), dec!(1))],
            None,
        );

        let derived = snapshot.with_cumulative();

        let bid_cumulative: Vec<Decimal> = derived
            .bids
            .iter()
            .map(|l| l.cumulative.unwrap())
            .collect();
        assert_eq!(bid_cumulative, vec![dec!(1.5), dec!(4.0), dec!(5.0)]);
        assert_eq!(
            bid_cumulative.last().copied().unwrap(),
            snapshot.total_bid_quantity()
        );

        let ask_cumulative: Vec<Decimal> = derived
            .asks
            .iter()
            .map(|l| l.cumulative.unwrap())
            .collect();
        assert_eq!(ask_cumulative, vec![dec!(4), dec!(5)]);
        assert_eq!(
            ask_cumulative.last().copied().unwrap(),
            snapshot.total_ask_quantity()
        );

        // Source snapshot untouched.
        assert!(snapshot.bids.iter().all(|l| l.cumulative.is_none()));
        assert!(snapshot.asks.iter().all(|l| l.cumulative.is_none()));
    }

    #[test]
    fn quality_score_averages_components() {
        let record = DataQualityRecord {
            latency_ms: 42.0,
            completeness: 1.0,
            accuracy: 1.0,
            freshness: 0.5,
            reliability: 0.5,
            consecutive_errors: 0,
        };
        assert!((record.score() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(VenueConnectionState::Connected.to_string(), "CONNECTED");
        assert_eq!(VenueConnectionState::Failed.to_string(), "FAILED");
    }

    #[test]
    fn book_key_display_and_equality() {
        let a = BookKey::new("kraken", "BTC-USD");
        let b = BookKey::new("kraken", "BTC-USD");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "kraken:BTC-USD");
    }
}
