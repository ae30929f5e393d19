//! Price-bucketed volume profile with exponential time decay.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::history::HistoricalPoint;

// ============================================================================
// Types
// ============================================================================

/// Decay-weighted volume resting at one price bucket.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeProfileBucket {
    /// Bucket price, rounded to the requested step.
    pub price: Decimal,
    /// Decay-weighted bid volume in the bucket.
    pub bid_volume: f64,
    /// Decay-weighted ask volume in the bucket.
    pub ask_volume: f64,
    /// Decay-weighted total volume in the bucket.
    pub total_volume: f64,
    /// Bucket share of the whole profile, in percent.
    pub percentage: f64,
    /// Number of price levels that contributed to the bucket.
    pub level_count: usize,
}

/// Volume profile for one venue and symbol over a time range.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeProfile {
    /// Venue the snapshots came from.
    pub venue: String,
    /// Symbol the snapshots came from.
    pub symbol: String,
    /// Price step the buckets are rounded to.
    pub price_step: Decimal,
    /// Number of snapshots that contributed.
    pub snapshot_count: usize,
    /// When the profile was computed.
    pub generated_at: DateTime<Utc>,
    /// Buckets in ascending price order.
    pub buckets: Vec<VolumeProfileBucket>,
}

#[derive(Default)]
struct BucketAccumulator {
    bid: f64,
    ask: f64,
    levels: usize,
}

// ============================================================================
// Profile construction
// ============================================================================

/// Bucket every level quantity of `points` by price, each snapshot
/// weighted by exponential decay of its age at `now`.
///
/// Buckets come back in ascending price order; only non-empty buckets
/// are emitted.
#[must_use]
pub fn build(
    points: &[&HistoricalPoint],
    price_step: Decimal,
    half_life: Duration,
    now: DateTime<Utc>,
) -> Vec<VolumeProfileBucket> {
    let mut accumulators: BTreeMap<Decimal, BucketAccumulator> = BTreeMap::new();

    for point in points {
        let weight = decay_weight(age_seconds(now, point.timestamp), half_life);
        if weight <= 0.0 {
            continue;
        }

        for level in &point.snapshot.bids {
            let bucket = accumulators
                .entry(bucket_price(level.price, price_step))
                .or_default();
            bucket.bid += level.quantity.to_f64().unwrap_or(0.0) * weight;
            bucket.levels += 1;
        }
        for level in &point.snapshot.asks {
            let bucket = accumulators
                .entry(bucket_price(level.price, price_step))
                .or_default();
            bucket.ask += level.quantity.to_f64().unwrap_or(0.0) * weight;
            bucket.levels += 1;
        }
    }

    let grand_total: f64 = accumulators.values().map(|b| b.bid + b.ask).sum();

    accumulators
        .into_iter()
        .map(|(price, acc)| {
            let total = acc.bid + acc.ask;
            VolumeProfileBucket {
                price,
                bid_volume: acc.bid,
                ask_volume: acc.ask,
                total_volume: total,
                percentage: if grand_total > 0.0 {
                    total / grand_total * 100.0
                } else {
                    0.0
                },
                level_count: acc.levels,
            }
        })
        .collect()
}

/// Round a price to the nearest multiple of `step`.
///
/// A non-positive step leaves prices unbucketed.
#[must_use]
pub fn bucket_price(price: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return price;
    }
    (price / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * step
}

/// Half-life decay weight for an entry `age_secs` old.
///
/// A zero half-life disables decay.
#[must_use]
pub(crate) fn decay_weight(age_secs: f64, half_life: Duration) -> f64 {
    let half_life_secs = half_life.as_secs_f64();
    if half_life_secs <= 0.0 {
        return 1.0;
    }
    (-age_secs.max(0.0) / half_life_secs).exp2()
}

/// Age of `timestamp` at `now` in seconds, clamped to zero.
#[must_use]
pub(crate) fn age_seconds(now: DateTime<Utc>, timestamp: DateTime<Utc>) -> f64 {
    let millis = (now - timestamp).num_milliseconds().max(0) as f64;
    millis / 1000.0
}
