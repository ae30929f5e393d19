//! Snapshot ingestion and analytics queries over retained history.
//!
//! The processor is the single logical writer of its stores: one
//! consumer task calls [`OrderbookProcessor::ingest`] per broadcast
//! snapshot, every query takes a read lock. Each venue and symbol pair
//! gets its own bounded rings, so one noisy book cannot evict another
//! book's history.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{BookKey, OrderbookSnapshot, PriceLevel, Side};
use crate::zones::PressureZone;

use super::history::{BoundedHistory, HistoricalPoint, SpreadSample};
use super::impact::{self, MarketImpact};
use super::prediction::{self, MarketSample, Prediction};
use super::profile::{self, VolumeProfile};
use super::spread::{self, SpreadAnalysis};

// ============================================================================
// Configuration
// ============================================================================

/// Tuning for retained history and derived analytics.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Snapshots retained per venue and symbol.
    pub history_capacity: usize,
    /// Spread samples retained per venue and symbol.
    pub spread_capacity: usize,
    /// Rolling window the time slices partition.
    pub history_window: Duration,
    /// Number of discrete slices the history window maps onto.
    pub time_slices: u32,
    /// Levels kept per side when merging books across venues.
    pub merge_depth: usize,
    /// Most recent samples covered by the spread trend fit.
    pub trend_window: usize,
    /// Least-squares slope beyond which spread drift counts as a trend.
    pub trend_threshold: f64,
    /// Half-life for volume profile and level freshness decay.
    pub decay_half_life: Duration,
    /// Points required before a prediction is attempted.
    pub feature_window: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            spread_capacity: 500,
            history_window: Duration::from_secs(600),
            time_slices: 50,
            merge_depth: 20,
            trend_window: 20,
            trend_threshold: 0.001,
            decay_half_life: Duration::from_secs(300),
            feature_window: 10,
        }
    }
}

// ============================================================================
// Result types
// ============================================================================

/// Per-side consolidated book across venues.
#[derive(Debug, Clone, Serialize)]
pub struct MergedOrderbook {
    /// Symbol the books were merged for.
    pub symbol: String,
    /// Venues that actually contributed a snapshot.
    pub venues: Vec<String>,
    /// Timestamp of the newest contributing snapshot.
    pub timestamp: DateTime<Utc>,
    /// Merged bids, descending by price.
    pub bids: Vec<PriceLevel>,
    /// Merged asks, ascending by price.
    pub asks: Vec<PriceLevel>,
}

/// Running cumulative depth with per-level freshness weighting.
#[derive(Debug, Clone, Serialize)]
pub struct CumulativeDepth {
    /// Venue of the underlying snapshot.
    pub venue: String,
    /// Symbol of the underlying snapshot.
    pub symbol: String,
    /// Bid side, running cumulative in book order.
    pub bids: Vec<DepthPoint>,
    /// Ask side, running cumulative in book order.
    pub asks: Vec<DepthPoint>,
    /// Mean level quantity on the bid side.
    pub avg_bid_order_size: Decimal,
    /// Mean level quantity on the ask side.
    pub avg_ask_order_size: Decimal,
    /// When the depth profile was computed.
    pub generated_at: DateTime<Utc>,
}

/// One level of a cumulative depth profile.
#[derive(Debug, Clone, Serialize)]
pub struct DepthPoint {
    /// Level price.
    pub price: Decimal,
    /// Quantity resting at this level.
    pub quantity: Decimal,
    /// Quantity resting at this level and all better levels.
    pub cumulative: Decimal,
    /// Decay weight of the level's age; 1.0 is freshly observed.
    pub freshness: f64,
}

/// Occupancy of the retained rings for one venue and symbol.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    /// Venue the rings belong to.
    pub venue: String,
    /// Symbol the rings belong to.
    pub symbol: String,
    /// Retained snapshot count.
    pub point_count: usize,
    /// Snapshot ring capacity.
    pub point_capacity: usize,
    /// Retained spread sample count.
    pub spread_sample_count: usize,
    /// Spread ring capacity.
    pub spread_capacity: usize,
    /// Timestamp of the oldest retained snapshot.
    pub oldest: Option<DateTime<Utc>>,
    /// Timestamp of the newest retained snapshot.
    pub newest: Option<DateTime<Utc>>,
}

// ============================================================================
// Processor
// ============================================================================

struct BookState {
    history: BoundedHistory<HistoricalPoint>,
    spreads: BoundedHistory<SpreadSample>,
    first_seen: DateTime<Utc>,
}

/// Retained history and analytics for every tracked book.
pub struct OrderbookProcessor {
    config: ProcessorConfig,
    books: RwLock<HashMap<BookKey, BookState>>,
}

impl OrderbookProcessor {
    /// Create a processor with the given tuning.
    #[must_use]
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Record a snapshot and the zones detected for it.
    ///
    /// Stores a copy with per-side running cumulative populated and
    /// appends one spread sample when the book is two-sided.
    pub fn ingest(&self, snapshot: &OrderbookSnapshot, zones: Vec<PressureZone>) {
        let key = snapshot.key();
        let mut books = self.books.write();
        let state = books.entry(key).or_insert_with(|| BookState {
            history: BoundedHistory::new(self.config.history_capacity),
            spreads: BoundedHistory::new(self.config.spread_capacity),
            first_seen: snapshot.timestamp,
        });

        if let Some(value) = snapshot.spread() {
            state.spreads.push(SpreadSample {
                timestamp: snapshot.timestamp,
                value,
            });
        }

        let time_slice = time_slice(&self.config, state.first_seen, snapshot.timestamp);
        state.history.push(HistoricalPoint {
            timestamp: snapshot.timestamp,
            snapshot: snapshot.with_cumulative(),
            zones,
            time_slice,
        });
    }

    /// Latest stored snapshot for a book, cumulative populated.
    #[must_use]
    pub fn latest_snapshot(&self, venue: &str, symbol: &str) -> Option<OrderbookSnapshot> {
        let books = self.books.read();
        books
            .get(&BookKey::new(venue, symbol))?
            .history
            .latest()
            .map(|point| point.snapshot.clone())
    }

    /// Latest stored snapshot for every symbol tracked on a venue,
    /// sorted by symbol.
    #[must_use]
    pub fn latest_for_venue(&self, venue: &str) -> Vec<OrderbookSnapshot> {
        let books = self.books.read();
        let mut snapshots: Vec<OrderbookSnapshot> = books
            .iter()
            .filter(|(key, _)| key.venue == venue)
            .filter_map(|(_, state)| state.history.latest())
            .map(|point| point.snapshot.clone())
            .collect();
        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        snapshots
    }

    /// Retained points for a book no older than `range`, oldest first.
    #[must_use]
    pub fn historical_snapshots(
        &self,
        venue: &str,
        symbol: &str,
        range: Duration,
    ) -> Vec<HistoricalPoint> {
        let cutoff = lookback_cutoff(Utc::now(), range);
        let books = self.books.read();
        let Some(state) = books.get(&BookKey::new(venue, symbol)) else {
            return Vec::new();
        };
        state
            .history
            .iter()
            .filter(|point| point.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Ring occupancy for a book.
    #[must_use]
    pub fn history_stats(&self, venue: &str, symbol: &str) -> Option<HistoryStats> {
        let books = self.books.read();
        let state = books.get(&BookKey::new(venue, symbol))?;
        Some(HistoryStats {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            point_count: state.history.len(),
            point_capacity: state.history.capacity(),
            spread_sample_count: state.spreads.len(),
            spread_capacity: state.spreads.capacity(),
            oldest: state.history.oldest().map(|point| point.timestamp),
            newest: state.history.latest().map(|point| point.timestamp),
        })
    }

    /// Every venue and symbol pair with retained history, sorted.
    #[must_use]
    pub fn tracked_books(&self) -> Vec<BookKey> {
        let books = self.books.read();
        let mut keys: Vec<BookKey> = books.keys().cloned().collect();
        keys.sort_by(|a, b| (&a.venue, &a.symbol).cmp(&(&b.venue, &b.symbol)));
        keys
    }

    /// Consolidate the latest snapshot of each requested venue into one
    /// book, summing quantity at identical prices.
    ///
    /// `None` when no requested venue has data for the symbol.
    #[must_use]
    pub fn merged_orderbook(&self, symbol: &str, venues: &[String]) -> Option<MergedOrderbook> {
        let books = self.books.read();

        let mut bid_depth: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        let mut ask_depth: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        let mut contributors: Vec<String> = Vec::new();
        let mut newest: Option<DateTime<Utc>> = None;

        for venue in venues {
            let Some(point) = books
                .get(&BookKey::new(venue.as_str(), symbol))
                .and_then(|state| state.history.latest())
            else {
                continue;
            };

            contributors.push(venue.clone());
            newest = Some(newest.map_or(point.timestamp, |ts| ts.max(point.timestamp)));
            for level in &point.snapshot.bids {
                *bid_depth.entry(level.price).or_insert(Decimal::ZERO) += level.quantity;
            }
            for level in &point.snapshot.asks {
                *ask_depth.entry(level.price).or_insert(Decimal::ZERO) += level.quantity;
            }
        }

        let timestamp = newest?;
        let to_level = |(price, quantity): (&Decimal, &Decimal)| {
            PriceLevel::new(*price, *quantity, timestamp)
        };
        Some(MergedOrderbook {
            symbol: symbol.to_string(),
            venues: contributors,
            timestamp,
            bids: bid_depth
                .iter()
                .rev()
                .take(self.config.merge_depth)
                .map(to_level)
                .collect(),
            asks: ask_depth
                .iter()
                .take(self.config.merge_depth)
                .map(to_level)
                .collect(),
        })
    }

    /// Spread statistics for a book over its retained samples.
    #[must_use]
    pub fn spread_analysis(&self, venue: &str, symbol: &str) -> Option<SpreadAnalysis> {
        let samples: Vec<SpreadSample> = {
            let books = self.books.read();
            books
                .get(&BookKey::new(venue, symbol))?
                .spreads
                .iter()
                .copied()
                .collect()
        };
        spread::analyze(
            venue,
            symbol,
            &samples,
            self.config.trend_window,
            self.config.trend_threshold,
        )
    }

    /// Decay-weighted volume profile over snapshots within `range`.
    #[must_use]
    pub fn volume_profile(
        &self,
        venue: &str,
        symbol: &str,
        range: Duration,
        price_step: Decimal,
    ) -> Option<VolumeProfile> {
        let now = Utc::now();
        let cutoff = lookback_cutoff(now, range);
        let books = self.books.read();
        let state = books.get(&BookKey::new(venue, symbol))?;

        let points: Vec<&HistoricalPoint> = state
            .history
            .iter()
            .filter(|point| point.timestamp >= cutoff)
            .collect();
        if points.is_empty() {
            return None;
        }

        let buckets = profile::build(&points, price_step, self.config.decay_half_life, now);
        Some(VolumeProfile {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            price_step,
            snapshot_count: points.len(),
            generated_at: now,
            buckets,
        })
    }

    /// Cumulative depth profile of a snapshot with freshness weights.
    #[must_use]
    pub fn cumulative_depth(&self, snapshot: &OrderbookSnapshot) -> CumulativeDepth {
        cumulative_depth(snapshot, self.config.decay_half_life, Utc::now())
    }

    /// Market impact estimate against the latest stored snapshot.
    #[must_use]
    pub fn market_impact(
        &self,
        venue: &str,
        symbol: &str,
        size: Decimal,
        side: Side,
    ) -> Option<MarketImpact> {
        let snapshot = self.latest_snapshot(venue, symbol)?;
        impact::estimate(&snapshot, size, side)
    }

    /// Direction score over the most recent feature window.
    ///
    /// Books with fewer valid points than the window yield an explicit
    /// insufficient-data result, never an error.
    #[must_use]
    pub fn prediction(&self, venue: &str, symbol: &str, horizon: Duration) -> Prediction {
        let samples: Vec<MarketSample> = {
            let books = self.books.read();
            let Some(state) = books.get(&BookKey::new(venue, symbol)) else {
                return Prediction::insufficient(venue, symbol, horizon, 0);
            };
            let skip = state.history.len().saturating_sub(self.config.feature_window);
            state
                .history
                .iter()
                .skip(skip)
                .filter_map(|point| MarketSample::from_snapshot(&point.snapshot))
                .collect()
        };

        if samples.len() < self.config.feature_window {
            return Prediction::insufficient(venue, symbol, horizon, samples.len());
        }
        let Some(features) = prediction::extract_features(&samples) else {
            return Prediction::insufficient(venue, symbol, horizon, samples.len());
        };

        let (direction, confidence) = prediction::score_features(&features);
        Prediction {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            horizon,
            direction,
            confidence,
            insufficient_data: false,
            sample_count: samples.len(),
            generated_at: Utc::now(),
        }
    }
}

impl Default for OrderbookProcessor {
    fn default() -> Self {
        Self::new(ProcessorConfig::default())
    }
}

impl std::fmt::Debug for OrderbookProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderbookProcessor")
            .field("config", &self.config)
            .field("tracked_books", &self.books.read().len())
            .finish()
    }
}

// ============================================================================
// Pure helpers
// ============================================================================

/// Cumulative depth of a snapshot at `now`.
#[must_use]
pub fn cumulative_depth(
    snapshot: &OrderbookSnapshot,
    half_life: Duration,
    now: DateTime<Utc>,
) -> CumulativeDepth {
    CumulativeDepth {
        venue: snapshot.venue.clone(),
        symbol: snapshot.symbol.clone(),
        bids: depth_points(&snapshot.bids, half_life, now),
        asks: depth_points(&snapshot.asks, half_life, now),
        avg_bid_order_size: average_level_size(&snapshot.bids),
        avg_ask_order_size: average_level_size(&snapshot.asks),
        generated_at: now,
    }
}

fn depth_points(levels: &[PriceLevel], half_life: Duration, now: DateTime<Utc>) -> Vec<DepthPoint> {
    let mut running = Decimal::ZERO;
    levels
        .iter()
        .map(|level| {
            running += level.quantity;
            DepthPoint {
                price: level.price,
                quantity: level.quantity,
                cumulative: running,
                freshness: profile::decay_weight(
                    profile::age_seconds(now, level.timestamp),
                    half_life,
                ),
            }
        })
        .collect()
}

fn average_level_size(levels: &[PriceLevel]) -> Decimal {
    if levels.is_empty() {
        return Decimal::ZERO;
    }
    levels.iter().map(|level| level.quantity).sum::<Decimal>() / Decimal::from(levels.len())
}

/// Map a snapshot's offset from the book's first ingest into one of
/// `time_slices` discrete slices of the rolling window, wrapping at the
/// window boundary.
fn time_slice(config: &ProcessorConfig, first_seen: DateTime<Utc>, at: DateTime<Utc>) -> u32 {
    let window_ms = i64::try_from(config.history_window.as_millis())
        .unwrap_or(i64::MAX)
        .max(1);
    let slices = i64::from(config.time_slices.max(1));
    let elapsed_ms = (at - first_seen).num_milliseconds().max(0);
    let position = elapsed_ms % window_ms;
    u32::try_from(position * slices / window_ms).unwrap_or(0)
}

/// Earliest timestamp still inside a lookback of `range` from `now`.
fn lookback_cutoff(now: DateTime<Utc>, range: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(range)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
