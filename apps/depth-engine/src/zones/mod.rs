//! Pressure zone detection over order book depth.
//!
//! A pressure zone is a cluster of adjacent price levels holding an
//! outsized share of one side's resting volume. The detector clusters
//! levels, scores cluster intensity and classifies how each zone has
//! moved against its own recent history. Side modules add depth
//! imbalance and a time/price heatmap over snapshot windows.

pub mod detector;
pub mod heatmap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Side;

pub use detector::{DetectorConfig, PressureZoneDetector};
pub use heatmap::{DepthHeatmap, DepthImbalance, HeatmapCell, ImbalanceSignal, heatmap, imbalance};

// ============================================================================
// Zone types
// ============================================================================

/// How a zone compares to similar zones seen recently at nearby prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneMovement {
    /// Intensity is rising versus the recent average.
    Strengthening,
    /// Intensity is falling versus the recent average.
    Weakening,
    /// No significant drift, or not enough history to tell.
    Stable,
}

impl std::fmt::Display for ZoneMovement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strengthening => write!(f, "strengthening"),
            Self::Weakening => write!(f, "weakening"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// A detected volume concentration on one side of the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureZone {
    /// Side of the book the zone sits on.
    pub side: Side,
    /// Lowest price in the cluster.
    pub price_start: Decimal,
    /// Highest price in the cluster.
    pub price_end: Decimal,
    /// Total resting quantity across the clustered levels.
    pub volume: Decimal,
    /// Intensity score; grows with volume share, level count and how
    /// concentrated the volume is within the cluster.
    pub intensity: f64,
    /// Number of price levels in the cluster.
    pub level_count: usize,
    /// Snapshot time the zone was detected at.
    pub timestamp: DateTime<Utc>,
    /// Movement classification versus similar recent zones.
    pub movement: ZoneMovement,
    /// Confidence in the movement classification, in `[0.2, 0.9]`.
    pub movement_confidence: f64,
}

impl PressureZone {
    /// Price midpoint of the zone, used for similarity lookups.
    #[must_use]
    pub fn midpoint(&self) -> Decimal {
        (self.price_start + self.price_end) / Decimal::TWO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_zone_midpoint() {
        let zone = PressureZone {
            side: Side::Bid,
            price_start: dec!(99),
            price_end: dec!(101),
            volume: dec!(50),
            intensity: 12.0,
            level_count: 3,
            timestamp: Utc::now(),
            movement: ZoneMovement::Stable,
            movement_confidence: 0.2,
        };

        assert_eq!(zone.midpoint(), dec!(100));
    }

    #[test]
    fn test_movement_display() {
        assert_eq!(ZoneMovement::Strengthening.to_string(), "strengthening");
        assert_eq!(ZoneMovement::Stable.to_string(), "stable");
    }
}
