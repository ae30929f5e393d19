//! Depth imbalance and time/price liquidity heatmaps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::models::{OrderbookSnapshot, PriceLevel};

// ============================================================================
// Constants
// ============================================================================

/// Levels per side counted into the imbalance ratio.
const IMBALANCE_DEPTH: usize = 10;

/// Bid share above which the book reads bullish.
const BULLISH_THRESHOLD: f64 = 0.65;

/// Bid share below which the book reads bearish.
const BEARISH_THRESHOLD: f64 = 0.35;

/// Default number of time slots in a heatmap.
pub const DEFAULT_TIME_SLOTS: u32 = 24;

/// Default number of price slots in a heatmap.
pub const DEFAULT_PRICE_SLOTS: u32 = 48;

// ============================================================================
// Imbalance
// ============================================================================

/// Directional read of the bid/ask volume split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImbalanceSignal {
    /// Bid-heavy book.
    Bullish,
    /// Ask-heavy book.
    Bearish,
    /// Volume split near even.
    Neutral,
}

impl std::fmt::Display for ImbalanceSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Top-of-book volume imbalance for one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DepthImbalance {
    /// Venue of the snapshot.
    pub venue: String,
    /// Symbol of the snapshot.
    pub symbol: String,
    /// Bid volume over the counted levels.
    pub bid_volume: Decimal,
    /// Ask volume over the counted levels.
    pub ask_volume: Decimal,
    /// Bid share of total counted volume; 0.5 for an empty book.
    pub ratio: f64,
    /// Directional classification of the ratio.
    pub signal: ImbalanceSignal,
    /// Distance from an even split, scaled to `[0, 1]`.
    pub intensity: f64,
    /// Snapshot timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Volume imbalance over the top [`IMBALANCE_DEPTH`] levels per side.
///
/// An empty book is reported as perfectly balanced at zero intensity.
#[must_use]
pub fn imbalance(snapshot: &OrderbookSnapshot) -> DepthImbalance {
    let top = |levels: &[PriceLevel]| -> Decimal {
        levels
            .iter()
            .take(IMBALANCE_DEPTH)
            .map(|level| level.quantity)
            .sum()
    };
    let bid_volume = top(&snapshot.bids);
    let ask_volume = top(&snapshot.asks);
    let total = bid_volume + ask_volume;

    let ratio = if total > Decimal::ZERO {
        (bid_volume / total).to_f64().unwrap_or(0.5)
    } else {
        0.5
    };
    let signal = if ratio > BULLISH_THRESHOLD {
        ImbalanceSignal::Bullish
    } else if ratio < BEARISH_THRESHOLD {
        ImbalanceSignal::Bearish
    } else {
        ImbalanceSignal::Neutral
    };

    DepthImbalance {
        venue: snapshot.venue.clone(),
        symbol: snapshot.symbol.clone(),
        bid_volume,
        ask_volume,
        ratio,
        signal,
        intensity: (ratio - 0.5).abs() * 2.0,
        timestamp: snapshot.timestamp,
    }
}

// ============================================================================
// Heatmap
// ============================================================================

/// One populated cell of a depth heatmap.
#[derive(Debug, Clone, Serialize)]
pub struct HeatmapCell {
    /// Time slot index, 0 at the window start.
    pub time_slot: u32,
    /// Price slot index, 0 at the observed minimum price.
    pub price_slot: u32,
    /// Summed bid quantity in the cell.
    pub bid_volume: Decimal,
    /// Summed ask quantity in the cell.
    pub ask_volume: Decimal,
    /// Cell total over the hottest cell's total, clamped to 1.
    pub intensity: f64,
    /// Log-compressed intensity: `ln(1+total) / ln(1+max)`.
    pub temperature: f64,
}

/// Liquidity heatmap over a window of snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct DepthHeatmap {
    /// Number of time slots the window was partitioned into.
    pub time_slots: u32,
    /// Number of price slots the range was partitioned into.
    pub price_slots: u32,
    /// Earliest snapshot timestamp in the window.
    pub time_start: DateTime<Utc>,
    /// Latest snapshot timestamp in the window.
    pub time_end: DateTime<Utc>,
    /// Lowest observed level price.
    pub price_min: Decimal,
    /// Highest observed level price.
    pub price_max: Decimal,
    /// Populated cells ordered by time then price slot.
    pub cells: Vec<HeatmapCell>,
}

/// Partition the snapshots' time window and observed price range into a
/// grid, summing bid/ask volume per cell. Only non-zero cells are
/// emitted.
///
/// `None` when the input holds no snapshots or no levels at all.
#[must_use]
pub fn heatmap(
    snapshots: &[OrderbookSnapshot],
    time_slots: u32,
    price_slots: u32,
) -> Option<DepthHeatmap> {
    let time_slots = time_slots.max(1);
    let price_slots = price_slots.max(1);

    let time_start = snapshots.iter().map(|s| s.timestamp).min()?;
    let time_end = snapshots.iter().map(|s| s.timestamp).max()?;
    let all_prices = snapshots
        .iter()
        .flat_map(|s| s.bids.iter().chain(s.asks.iter()))
        .map(|level| level.price);
    let price_min = all_prices.clone().min()?;
    let price_max = all_prices.max()?;

    let span_ms = (time_end - time_start).num_milliseconds();
    let price_range = price_max - price_min;

    let mut grid: BTreeMap<(u32, u32), (Decimal, Decimal)> = BTreeMap::new();
    for snapshot in snapshots {
        let time_slot = time_slot_index(snapshot.timestamp, time_start, span_ms, time_slots);
        for level in &snapshot.bids {
            let price_slot = price_slot_index(level.price, price_min, price_range, price_slots);
            let cell = grid
                .entry((time_slot, price_slot))
                .or_insert((Decimal::ZERO, Decimal::ZERO));
            cell.0 += level.quantity;
        }
        for level in &snapshot.asks {
            let price_slot = price_slot_index(level.price, price_min, price_range, price_slots);
            let cell = grid
                .entry((time_slot, price_slot))
                .or_insert((Decimal::ZERO, Decimal::ZERO));
            cell.1 += level.quantity;
        }
    }

    let max_total = grid
        .values()
        .map(|(bid, ask)| *bid + *ask)
        .max()
        .unwrap_or(Decimal::ZERO)
        .to_f64()
        .unwrap_or(0.0);
    if max_total <= 0.0 {
        return None;
    }
    let log_max = max_total.ln_1p();

    let cells = grid
        .into_iter()
        .map(|((time_slot, price_slot), (bid_volume, ask_volume))| {
            let total = (bid_volume + ask_volume).to_f64().unwrap_or(0.0);
            HeatmapCell {
                time_slot,
                price_slot,
                bid_volume,
                ask_volume,
                intensity: (total / max_total).clamp(0.0, 1.0),
                temperature: if log_max > 0.0 {
                    total.ln_1p() / log_max
                } else {
                    0.0
                },
            }
        })
        .collect();

    Some(DepthHeatmap {
        time_slots,
        price_slots,
        time_start,
        time_end,
        price_min,
        price_max,
        cells,
    })
}

fn time_slot_index(
    at: DateTime<Utc>,
    start: DateTime<Utc>,
    span_ms: i64,
    slots: u32,
) -> u32 {
    if span_ms <= 0 {
        return 0;
    }
    let offset = (at - start).num_milliseconds().clamp(0, span_ms);
    let index = offset * i64::from(slots) / span_ms;
    u32::try_from(index).unwrap_or(0).min(slots - 1)
}

fn price_slot_index(price: Decimal, min: Decimal, range: Decimal, slots: u32) -> u32 {
    if range <= Decimal::ZERO {
        return 0;
    }
    let index = ((price - min) / range * Decimal::from(slots)).floor();
    index.to_u32().unwrap_or(0).min(slots - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    fn book(
        timestamp: DateTime<Utc>,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
    ) -> OrderbookSnapshot {
        let to_levels = |pairs: Vec<(Decimal, Decimal)>| {
            pairs
                .into_iter()
                .map(|(p, q)| PriceLevel::new(p, q, timestamp))
                .collect()
        };
        OrderbookSnapshot::new(
            "BTC-USD",
            "binance",
            timestamp,
            to_levels(bids),
            to_levels(asks),
            None,
        )
    }

    // ========================================================================
    // Imbalance
    // ========================================================================

    #[test]
    fn test_balanced_book_is_neutral() {
        let snapshot = book(
            Utc::now(),
            vec![(dec!(99), dec!(5))],
            vec![(dec!(101), dec!(5))],
        );
        let result = imbalance(&snapshot);

        assert!((result.ratio - 0.5).abs() < 1e-12);
        assert_eq!(result.signal, ImbalanceSignal::Neutral);
        assert!(result.intensity.abs() < 1e-12);
    }

    #[test]
    fn test_bid_heavy_book_is_bullish() {
        let snapshot = book(
            Utc::now(),
            vec![(dec!(99), dec!(8))],
            vec![(dec!(101), dec!(2))],
        );
        let result = imbalance(&snapshot);

        assert!((result.ratio - 0.8).abs() < 1e-12);
        assert_eq!(result.signal, ImbalanceSignal::Bullish);
        assert!((result.intensity - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_ask_heavy_book_is_bearish() {
        let snapshot = book(
            Utc::now(),
            vec![(dec!(99), dec!(1))],
            vec![(dec!(101), dec!(9))],
        );
        let result = imbalance(&snapshot);

        assert!(result.ratio < BEARISH_THRESHOLD);
        assert_eq!(result.signal, ImbalanceSignal::Bearish);
    }

    #[test]
    fn test_signal_display() {
        assert_eq!(ImbalanceSignal::Bullish.to_string(), "bullish");
        assert_eq!(ImbalanceSignal::Bearish.to_string(), "bearish");
        assert_eq!(ImbalanceSignal::Neutral.to_string(), "neutral");
    }

    #[test]
    fn test_empty_book_reads_balanced() {
        let snapshot = book(Utc::now(), vec![], vec![]);
        let result = imbalance(&snapshot);

        assert!((result.ratio - 0.5).abs() < 1e-12);
        assert_eq!(result.signal, ImbalanceSignal::Neutral);
        assert!(result.intensity.abs() < 1e-12);
        assert_eq!(result.bid_volume, dec!(0));
    }

    #[test]
    fn test_only_top_levels_counted() {
        // Eleventh bid level holds a huge quantity; it must not count.
        let mut bids: Vec<(Decimal, Decimal)> = (0..10)
            .map(|i| (dec!(100) - Decimal::from(i), dec!(1)))
            .collect();
        bids.push((dec!(80), dec!(1000)));
        let snapshot = book(Utc::now(), bids, vec![(dec!(101), dec!(10))]);

        let result = imbalance(&snapshot);
        assert_eq!(result.bid_volume, dec!(10));
        assert_eq!(result.ask_volume, dec!(10));
        assert!((result.ratio - 0.5).abs() < 1e-12);
    }

    // ========================================================================
    // Heatmap
    // ========================================================================

    #[test]
    fn test_empty_input_is_none() {
        assert!(heatmap(&[], 24, 48).is_none());
        let no_levels = book(Utc::now(), vec![], vec![]);
        assert!(heatmap(&[no_levels], 24, 48).is_none());
    }

    #[test]
    fn test_price_slots_span_observed_range() {
        let now = Utc::now();
        let snapshot = book(
            now,
            vec![(dec!(99), dec!(1)), (dec!(100), dec!(2))],
            vec![(dec!(101), dec!(3))],
        );
        let map = heatmap(&[snapshot], 24, 4).unwrap();

        assert_eq!(map.price_min, dec!(99));
        assert_eq!(map.price_max, dec!(101));
        let slots: Vec<u32> = map.cells.iter().map(|c| c.price_slot).collect();
        // Range 99..101 over 4 slots: 99 -> 0, 100 -> 2, 101 clamps to 3.
        assert_eq!(slots, vec![0, 2, 3]);
        assert!(map.cells.iter().all(|c| c.time_slot == 0));
    }

    #[test]
    fn test_time_slots_partition_window() {
        let start = Utc::now();
        let early = book(start, vec![(dec!(100), dec!(1))], vec![]);
        let late = book(
            start + TimeDelta::seconds(60),
            vec![(dec!(100), dec!(1))],
            vec![],
        );
        let map = heatmap(&[early, late], 2, 48).unwrap();

        let time_slots: Vec<u32> = map.cells.iter().map(|c| c.time_slot).collect();
        assert_eq!(time_slots, vec![0, 1]);
    }

    #[test]
    fn test_intensity_and_temperature_scaling() {
        let now = Utc::now();
        // Two cells: totals 7 and 3.
        let snapshot = book(
            now,
            vec![(dec!(100), dec!(7))],
            vec![(dec!(200), dec!(3))],
        );
        let map = heatmap(&[snapshot], 1, 2).unwrap();

        let hot = map.cells.iter().find(|c| c.bid_volume == dec!(7)).unwrap();
        let cool = map.cells.iter().find(|c| c.ask_volume == dec!(3)).unwrap();

        assert!((hot.intensity - 1.0).abs() < 1e-12);
        assert!((hot.temperature - 1.0).abs() < 1e-12);
        assert!((cool.intensity - 3.0 / 7.0).abs() < 1e-12);
        assert!((cool.temperature - 4.0f64.ln() / 8.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_cells_merge_bid_and_ask_volume() {
        let now = Utc::now();
        // Bid and ask close enough to land in the same price slot.
        let snapshot = book(
            now,
            vec![(dec!(100.0), dec!(2))],
            vec![(dec!(100.1), dec!(3)), (dec!(200), dec!(1))],
        );
        let map = heatmap(&[snapshot], 1, 2).unwrap();

        let merged = map.cells.iter().find(|c| c.price_slot == 0).unwrap();
        assert_eq!(merged.bid_volume, dec!(2));
        assert_eq!(merged.ask_volume, dec!(3));
    }
}
