//! Spread statistics over the retained sample window.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::history::SpreadSample;

// ============================================================================
// Constants
// ============================================================================

/// Current spread below this fraction of the running average is tight.
const TIGHT_RATIO: f64 = 0.7;

/// Current spread above this fraction of the running average is wide.
const WIDE_RATIO: f64 = 1.3;

// ============================================================================
// Types
// ============================================================================

/// Direction of spread drift over the most recent samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadTrend {
    /// Least-squares slope above the trend threshold.
    Widening,
    /// Least-squares slope below the negated trend threshold.
    Narrowing,
    /// Slope within the threshold band, or not enough samples.
    Stable,
}

/// Current spread relative to its running average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadTightness {
    /// Below [`TIGHT_RATIO`] of the average.
    Tight,
    /// Within the normal band.
    Normal,
    /// Above [`WIDE_RATIO`] of the average.
    Wide,
}

/// Spread statistics for one venue and symbol.
#[derive(Debug, Clone, Serialize)]
pub struct SpreadAnalysis {
    /// Venue the samples came from.
    pub venue: String,
    /// Symbol the samples came from.
    pub symbol: String,
    /// Most recent spread.
    pub current: Decimal,
    /// Mean spread over the retained window.
    pub average: Decimal,
    /// Smallest retained spread.
    pub min: Decimal,
    /// Largest retained spread.
    pub max: Decimal,
    /// Drift classification over the trend window.
    pub trend: SpreadTrend,
    /// Current spread versus the running average.
    pub tightness: SpreadTightness,
    /// Number of samples the statistics cover.
    pub sample_count: usize,
}

// ============================================================================
// Analysis
// ============================================================================

/// Compute spread statistics over retained samples, oldest first.
///
/// Returns `None` when no samples have been retained.
#[must_use]
pub fn analyze(
    venue: &str,
    symbol: &str,
    samples: &[SpreadSample],
    trend_window: usize,
    trend_threshold: f64,
) -> Option<SpreadAnalysis> {
    let last = samples.last()?;

    let mut min = last.value;
    let mut max = last.value;
    let mut sum = Decimal::ZERO;
    for sample in samples {
        min = min.min(sample.value);
        max = max.max(sample.value);
        sum += sample.value;
    }
    let average = sum / Decimal::from(samples.len());

    Some(SpreadAnalysis {
        venue: venue.to_string(),
        symbol: symbol.to_string(),
        current: last.value,
        average,
        min,
        max,
        trend: classify_trend(samples, trend_window, trend_threshold),
        tightness: classify_tightness(last.value, average),
        sample_count: samples.len(),
    })
}

/// Classify drift from the least-squares slope of the most recent
/// `trend_window` samples against their index.
#[must_use]
pub fn classify_trend(
    samples: &[SpreadSample],
    trend_window: usize,
    trend_threshold: f64,
) -> SpreadTrend {
    let start = samples.len().saturating_sub(trend_window.max(2));
    let recent: Vec<f64> = samples[start..]
        .iter()
        .map(|s| s.value.to_f64().unwrap_or(0.0))
        .collect();

    let slope = least_squares_slope(&recent);
    if slope > trend_threshold {
        SpreadTrend::Widening
    } else if slope < -trend_threshold {
        SpreadTrend::Narrowing
    } else {
        SpreadTrend::Stable
    }
}

/// Classify the current spread against the running average.
#[must_use]
pub fn classify_tightness(current: Decimal, average: Decimal) -> SpreadTightness {
    if average <= Decimal::ZERO {
        return SpreadTightness::Normal;
    }

    let ratio = (current / average).to_f64().unwrap_or(1.0);
    if ratio < TIGHT_RATIO {
        SpreadTightness::Tight
    } else if ratio > WIDE_RATIO {
        SpreadTightness::Wide
    } else {
        SpreadTightness::Normal
    }
}

/// Slope of the ordinary least-squares fit of `values` against `0..n`.
fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let count = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (i, value) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += value;
        sum_xy += x * value;
        sum_xx += x * x;
    }

    let denominator = count * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    (count * sum_xy - sum_x * sum_y) / denominator
}
