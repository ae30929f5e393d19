//! Short-horizon direction scoring from engineered book features.
//!
//! Feature extraction and scoring are separate pure functions so each
//! can be pinned down in tests. Scoring combines feature deviations
//! through fixed weights and `tanh`; nothing here is fitted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::models::OrderbookSnapshot;

// ============================================================================
// Constants
// ============================================================================

/// Weight of the momentum deviation in the raw score.
const MOMENTUM_WEIGHT: f64 = 0.6;

/// Weight of the volume deviation term. Volume expansion confirms the
/// momentum signal.
const VOLUME_WEIGHT: f64 = 0.25;

/// Weight of the spread deviation term. Spread widening argues against
/// the momentum signal.
const SPREAD_WEIGHT: f64 = 0.15;

/// Deviations are small fractions; scale before `tanh` so ordinary moves
/// land away from zero.
const DEVIATION_SCALE: f64 = 50.0;

/// Confidence floor and ceiling.
const MIN_CONFIDENCE: f64 = 0.1;
const MAX_CONFIDENCE: f64 = 0.9;

/// Base confidence before score and volatility adjustments.
const BASE_CONFIDENCE: f64 = 0.5;

/// Confidence gained per unit of absolute direction score.
const SCORE_CONFIDENCE: f64 = 0.4;

/// Confidence lost per unit of mid-normalized volatility.
const VOLATILITY_PENALTY: f64 = 10.0;

// ============================================================================
// Types
// ============================================================================

/// One observation row a prediction is computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketSample {
    /// Mid price.
    pub mid: f64,
    /// Total resting quantity across both sides.
    pub volume: f64,
    /// Absolute spread.
    pub spread: f64,
}

impl MarketSample {
    /// Extract a sample from a snapshot.
    ///
    /// `None` when the book is one-sided and has no mid or spread.
    #[must_use]
    pub fn from_snapshot(snapshot: &OrderbookSnapshot) -> Option<Self> {
        let mid = snapshot.mid_price()?.to_f64()?;
        let spread = snapshot.spread()?.to_f64()?;
        let volume = (snapshot.total_bid_quantity() + snapshot.total_ask_quantity())
            .to_f64()
            .unwrap_or(0.0);
        Some(Self {
            mid,
            volume,
            spread,
        })
    }
}

/// The engineered features scoring works from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSet {
    /// Moving average of mid price over the window.
    pub mid_ma: f64,
    /// Moving average of total volume over the window.
    pub volume_ma: f64,
    /// Moving average of spread over the window.
    pub spread_ma: f64,
    /// Population standard deviation of mid price over the window.
    pub volatility: f64,
    /// Last mid divided by the mid moving average.
    pub momentum: f64,
    /// Last observed mid, kept for deviation scoring.
    pub last_mid: f64,
    /// Last observed volume.
    pub last_volume: f64,
    /// Last observed spread.
    pub last_spread: f64,
}

/// Direction score for one venue and symbol.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// Venue the samples came from.
    pub venue: String,
    /// Symbol the samples came from.
    pub symbol: String,
    /// Advisory horizon, echoed from the request.
    pub horizon: Duration,
    /// Direction score in `[-1, 1]`; positive is upward.
    pub direction: f64,
    /// Confidence in `[0.1, 0.9]`.
    pub confidence: f64,
    /// Set when fewer points were available than the feature window.
    pub insufficient_data: bool,
    /// Number of samples the features covered.
    pub sample_count: usize,
    /// When the prediction was computed.
    pub generated_at: DateTime<Utc>,
}

impl Prediction {
    /// Degraded result for a window with too few points.
    #[must_use]
    pub fn insufficient(venue: &str, symbol: &str, horizon: Duration, sample_count: usize) -> Self {
        Self {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            horizon,
            direction: 0.0,
            confidence: MIN_CONFIDENCE,
            insufficient_data: true,
            sample_count,
            generated_at: Utc::now(),
        }
    }
}

// ============================================================================
// Extraction and scoring
// ============================================================================

/// Compute the feature set over samples ordered oldest first.
#[must_use]
pub fn extract_features(samples: &[MarketSample]) -> Option<FeatureSet> {
    let last = samples.last()?;
    let count = samples.len() as f64;

    let mid_ma = samples.iter().map(|s| s.mid).sum::<f64>() / count;
    let volume_ma = samples.iter().map(|s| s.volume).sum::<f64>() / count;
    let spread_ma = samples.iter().map(|s| s.spread).sum::<f64>() / count;

    let variance = samples.iter().map(|s| (s.mid - mid_ma).powi(2)).sum::<f64>() / count;
    let momentum = if mid_ma > 0.0 { last.mid / mid_ma } else { 1.0 };

    Some(FeatureSet {
        mid_ma,
        volume_ma,
        spread_ma,
        volatility: variance.sqrt(),
        momentum,
        last_mid: last.mid,
        last_volume: last.volume,
        last_spread: last.spread,
    })
}

/// Combine feature deviations into `(direction, confidence)`.
///
/// Momentum drives the sign; volume expansion amplifies it and spread
/// widening dampens it. Volatility only lowers confidence.
#[must_use]
pub fn score_features(features: &FeatureSet) -> (f64, f64) {
    let momentum_dev = features.momentum - 1.0;
    let volume_dev = relative_deviation(features.last_volume, features.volume_ma);
    let spread_dev = relative_deviation(features.last_spread, features.spread_ma);

    let raw = MOMENTUM_WEIGHT * momentum_dev
        + VOLUME_WEIGHT * momentum_dev * volume_dev
        - SPREAD_WEIGHT * momentum_dev * spread_dev;
    let direction = (raw * DEVIATION_SCALE).tanh();

    let normalized_volatility = if features.mid_ma > 0.0 {
        features.volatility / features.mid_ma
    } else {
        0.0
    };
    let confidence = (BASE_CONFIDENCE + direction.abs() * SCORE_CONFIDENCE
        - normalized_volatility * VOLATILITY_PENALTY)
        .clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);

    (direction, confidence)
}

/// Deviation of `value` from `average` as a fraction of the average,
/// clamped to `[-1, 1]`. Zero when the average is not positive.
fn relative_deviation(value: f64, average: f64) -> f64 {
    if average > 0.0 {
        ((value - average) / average).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_samples(mid: f64, count: usize) -> Vec<MarketSample> {
        vec![
            MarketSample {
                mid,
                volume: 100.0,
                spread: 0.5,
            };
            count
        ]
    }

    fn trending_samples(start: f64, step: f64, count: usize) -> Vec<MarketSample> {
        (0..count)
            .map(|i| MarketSample {
                mid: start + step * i as f64,
                volume: 100.0,
                spread: 0.5,
            })
            .collect()
    }

    #[test]
    fn test_extract_features_known_values() {
        let samples = vec![
            MarketSample { mid: 1.0, volume: 10.0, spread: 0.1 },
            MarketSample { mid: 2.0, volume: 10.0, spread: 0.2 },
            MarketSample { mid: 3.0, volume: 10.0, spread: 0.3 },
        ];
        let features = extract_features(&samples).unwrap();

        assert!((features.mid_ma - 2.0).abs() < 1e-12);
        assert!((features.volume_ma - 10.0).abs() < 1e-12);
        assert!((features.spread_ma - 0.2).abs() < 1e-12);
        assert!((features.momentum - 1.5).abs() < 1e-12);
        // Population std-dev of [1, 2, 3] is sqrt(2/3).
        assert!((features.volatility - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((features.last_spread - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_extract_features_empty_is_none() {
        assert!(extract_features(&[]).is_none());
    }

    #[test]
    fn test_flat_market_scores_neutral() {
        let features = extract_features(&flat_samples(100.0, 10)).unwrap();
        let (direction, confidence) = score_features(&features);

        assert!(direction.abs() < 1e-12);
        assert!((confidence - BASE_CONFIDENCE).abs() < 1e-12);
    }

    #[test]
    fn test_rising_mids_score_positive() {
        let features = extract_features(&trending_samples(100.0, 0.2, 10)).unwrap();
        let (direction, confidence) = score_features(&features);

        assert!(direction > 0.1);
        assert!(direction <= 1.0);
        assert!(confidence > BASE_CONFIDENCE - 0.1);
    }

    #[test]
    fn test_falling_mids_score_negative() {
        let features = extract_features(&trending_samples(100.0, -0.2, 10)).unwrap();
        let (direction, _) = score_features(&features);

        assert!(direction < -0.1);
        assert!(direction >= -1.0);
    }

    #[test]
    fn test_volume_expansion_amplifies_direction() {
        let flat_volume = extract_features(&trending_samples(100.0, 0.2, 10)).unwrap();

        let mut expanding = flat_volume;
        expanding.last_volume = expanding.volume_ma * 1.8;

        let (base, _) = score_features(&flat_volume);
        let (amplified, _) = score_features(&expanding);
        assert!(amplified > base);
    }

    #[test]
    fn test_spread_widening_dampens_direction() {
        let features = extract_features(&trending_samples(100.0, 0.2, 10)).unwrap();

        let mut widening = features;
        widening.last_spread = widening.spread_ma * 1.9;

        let (base, _) = score_features(&features);
        let (dampened, _) = score_features(&widening);
        assert!(dampened < base);
        assert!(dampened > 0.0);
    }

    #[test]
    fn test_extreme_volatility_clamps_confidence_to_floor() {
        let samples: Vec<MarketSample> = (0..10)
            .map(|i| MarketSample {
                mid: if i % 2 == 0 { 50.0 } else { 150.0 },
                volume: 100.0,
                spread: 0.5,
            })
            .collect();
        let features = extract_features(&samples).unwrap();
        let (_, confidence) = score_features(&features);

        assert!((confidence - MIN_CONFIDENCE).abs() < 1e-12);
    }

    #[test]
    fn test_direction_saturates_within_bounds() {
        let features = extract_features(&trending_samples(100.0, 50.0, 10)).unwrap();
        let (direction, _) = score_features(&features);

        assert!(direction > 0.99);
        assert!(direction <= 1.0);
    }

    #[test]
    fn test_insufficient_result_shape() {
        let prediction =
            Prediction::insufficient("binance", "BTC-USD", Duration::from_secs(30), 4);

        assert!(prediction.insufficient_data);
        assert_eq!(prediction.direction, 0.0);
        assert!((prediction.confidence - MIN_CONFIDENCE).abs() < 1e-12);
        assert_eq!(prediction.sample_count, 4);
    }
}
