//! Per-venue data quality scoring.
//!
//! Tracks four component scores in `[0, 1]`: completeness (delivered
//! depth vs expected), accuracy (spread plausibility), freshness
//! (time-since-update bands) and reliability (success/failure record).
//! Freshness is band-stepped rather than continuous and is re-applied by
//! the manager's periodic decay sweep so idle venues decay without reads.

use std::time::{Duration, Instant};

use rust_decimal::prelude::ToPrimitive;

use crate::models::{DataQualityRecord, OrderbookSnapshot};

/// Tracks the quality record for one venue.
#[derive(Debug)]
pub struct QualityTracker {
    expected_depth: usize,
    max_spread_pct: f64,
    record: DataQualityRecord,
    last_success: Option<Instant>,
}

impl QualityTracker {
    /// Create a tracker scoring against the given expected depth and
    /// acceptable spread band.
    #[must_use]
    pub fn new(expected_depth: usize, max_spread_pct: f64) -> Self {
        Self {
            expected_depth: expected_depth.max(1),
            max_spread_pct,
            record: DataQualityRecord::default(),
            last_success: None,
        }
    }

    /// Score a successful poll.
    pub fn record_success(&mut self, latency: Duration, snapshot: &OrderbookSnapshot) {
        self.record.latency_ms = latency.as_secs_f64() * 1_000.0;

        let expected = self.expected_depth as f64;
        let bid_side = (snapshot.bids.len() as f64 / expected).min(1.0);
        let ask_side = (snapshot.asks.len() as f64 / expected).min(1.0);
        self.record.completeness = f64::midpoint(bid_side, ask_side);

        if let Some(spread_pct) = spread_percent(snapshot) {
            self.record.accuracy = accuracy_score(spread_pct, self.max_spread_pct);
        }

        self.record.reliability = (self.record.reliability + 0.05).min(1.0);
        self.record.consecutive_errors = 0;
        self.record.freshness = 1.0;
        self.last_success = Some(Instant::now());
    }

    /// Score a failed poll. Reliability decays faster than it recovers.
    pub fn record_failure(&mut self) {
        self.record.reliability *= 0.7;
        self.record.consecutive_errors += 1;
    }

    /// Re-apply the freshness band for the current data age.
    pub fn decay(&mut self) {
        let age = self
            .last_success
            .map_or(Duration::MAX, |t| t.elapsed());
        self.record.freshness = freshness_band(age);
    }

    /// Consecutive failures since the last success.
    #[must_use]
    pub const fn consecutive_errors(&self) -> u32 {
        self.record.consecutive_errors
    }

    /// Current quality record.
    #[must_use]
    pub fn record(&self) -> DataQualityRecord {
        self.record.clone()
    }
}

/// Freshness score for a given data age, in discrete bands.
#[must_use]
pub fn freshness_band(age: Duration) -> f64 {
    if age < Duration::from_secs(2) {
        1.0
    } else if age < Duration::from_secs(5) {
        0.8
    } else if age < Duration::from_secs(15) {
        0.5
    } else if age < Duration::from_secs(60) {
        0.2
    } else {
        0.0
    }
}

/// Spread as a percentage of mid, when both sides are quoted.
fn spread_percent(snapshot: &OrderbookSnapshot) -> Option<f64> {
    let spread = snapshot.spread()?;
    let mid = snapshot.mid_price()?;
    ((spread / mid) * rust_decimal::Decimal::ONE_HUNDRED).to_f64()
}

/// 1.0 inside the acceptable band, linearly penalized beyond it, zero at
/// twice the band. A negative spread means a crossed book and scores zero.
fn accuracy_score(spread_pct: f64, max_spread_pct: f64) -> f64 {
    if spread_pct < 0.0 {
        return 0.0;
    }
    if spread_pct <= max_spread_pct {
        return 1.0;
    }
    (1.0 - (spread_pct - max_spread_pct) / max_spread_pct).max(0.0)
}
