//! Pressure zone clustering and movement classification.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::analytics::BoundedHistory;
use crate::models::{BookKey, OrderbookSnapshot, PriceLevel, Side};

use super::{PressureZone, ZoneMovement};

// ============================================================================
// Configuration
// ============================================================================

/// Tuning for zone clustering and movement classification.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Maximum volume-weighted price distance for merging a level into
    /// the current cluster, in percent.
    pub cluster_threshold_pct: f64,
    /// Minimum share of the side's total volume a cluster needs to be
    /// admitted as a zone.
    pub min_volume_fraction: f64,
    /// Midpoint distance within which a historical zone counts as
    /// similar, in percent.
    pub similarity_tolerance_pct: f64,
    /// How far back similar zones are considered, relative to the
    /// snapshot being classified.
    pub movement_lookback: Duration,
    /// Similar zones required before drift is classified at all.
    pub min_similar_zones: usize,
    /// Most recent similar zones averaged into the intensity baseline.
    pub baseline_zones: usize,
    /// Intensity delta versus the baseline beyond which a zone counts
    /// as strengthening or weakening.
    pub movement_delta: f64,
    /// Zones retained in the shared history ring, across venues.
    pub history_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cluster_threshold_pct: 0.5,
            min_volume_fraction: 0.10,
            similarity_tolerance_pct: 2.0,
            movement_lookback: Duration::from_secs(300),
            min_similar_zones: 3,
            baseline_zones: 5,
            movement_delta: 5.0,
            history_capacity: 1000,
        }
    }
}

// ============================================================================
// Detector
// ============================================================================

#[derive(Debug)]
struct DetectorState {
    /// One ring shared across venues; sole input to movement lookups.
    history: BoundedHistory<PressureZone>,
    /// Last emitted zones per book.
    latest: HashMap<BookKey, Vec<PressureZone>>,
}

/// Detects pressure zones and tracks how they move over time.
#[derive(Debug)]
pub struct PressureZoneDetector {
    config: DetectorConfig,
    state: RwLock<DetectorState>,
}

impl PressureZoneDetector {
    /// Create a detector with the given tuning.
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        let history = BoundedHistory::new(config.history_capacity);
        Self {
            config,
            state: RwLock::new(DetectorState {
                history,
                latest: HashMap::new(),
            }),
        }
    }

    /// Detect zones on both sides of a snapshot, most intense first.
    ///
    /// Every emitted zone is appended to the shared history ring and
    /// replaces the book's previous result for [`Self::zones_for`].
    pub fn detect(&self, snapshot: &OrderbookSnapshot) -> Vec<PressureZone> {
        let mut zones = side_zones(&snapshot.bids, Side::Bid, snapshot.timestamp, &self.config);
        zones.extend(side_zones(
            &snapshot.asks,
            Side::Ask,
            snapshot.timestamp,
            &self.config,
        ));

        let mut state = self.state.write();
        for zone in &mut zones {
            let (movement, confidence) = classify_movement(&state.history, zone, &self.config);
            zone.movement = movement;
            zone.movement_confidence = confidence;
        }
        for zone in &zones {
            state.history.push(zone.clone());
        }

        zones.sort_by(|a, b| {
            b.intensity
                .partial_cmp(&a.intensity)
                .unwrap_or(Ordering::Equal)
        });
        state.latest.insert(snapshot.key(), zones.clone());
        zones
    }

    /// Latest zones emitted for a book; empty when never detected.
    #[must_use]
    pub fn zones_for(&self, venue: &str, symbol: &str) -> Vec<PressureZone> {
        self.state
            .read()
            .latest
            .get(&BookKey::new(venue, symbol))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of zones retained in the shared history ring.
    #[must_use]
    pub fn zone_history_len(&self) -> usize {
        self.state.read().history.len()
    }
}

impl Default for PressureZoneDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

// ============================================================================
// Clustering
// ============================================================================

/// Cluster one side and keep clusters holding enough of its volume.
fn side_zones(
    levels: &[PriceLevel],
    side: Side,
    timestamp: DateTime<Utc>,
    config: &DetectorConfig,
) -> Vec<PressureZone> {
    let side_total: Decimal = levels.iter().map(|level| level.quantity).sum();
    if side_total <= Decimal::ZERO {
        return Vec::new();
    }

    cluster_levels(levels, config.cluster_threshold_pct)
        .into_iter()
        .filter_map(|cluster| zone_from_cluster(&cluster, side, side_total, timestamp, config))
        .collect()
}

/// Single forward greedy pass over levels sorted ascending by price.
///
/// A level joins the current cluster when its volume-weighted distance
/// to the cluster's last level is within the threshold; otherwise it
/// starts a new cluster. There is no re-merge pass.
fn cluster_levels(levels: &[PriceLevel], threshold_pct: f64) -> Vec<Vec<&PriceLevel>> {
    let mut sorted: Vec<&PriceLevel> = levels.iter().collect();
    sorted.sort_by(|a, b| a.price.cmp(&b.price));

    let mut clusters: Vec<Vec<&PriceLevel>> = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return clusters;
    };

    let mut current = vec![first];
    for level in iter {
        let Some(previous) = current.last() else {
            continue;
        };
        if weighted_distance(previous, level) <= threshold_pct {
            current.push(level);
        } else {
            clusters.push(std::mem::replace(&mut current, vec![level]));
        }
    }
    clusters.push(current);
    clusters
}

/// Price distance in percent, stretched by the quantity imbalance of
/// the two levels: `pct_distance * (1 + |q1 - q2| / (q1 + q2))`.
fn weighted_distance(lower: &PriceLevel, upper: &PriceLevel) -> f64 {
    let pct_distance = ((upper.price - lower.price) / lower.price * Decimal::ONE_HUNDRED)
        .abs()
        .to_f64()
        .unwrap_or(f64::MAX);
    let imbalance = ((lower.quantity - upper.quantity).abs()
        / (lower.quantity + upper.quantity))
        .to_f64()
        .unwrap_or(1.0);
    pct_distance * (1.0 + imbalance)
}

/// Build a zone from a cluster, or drop it below the volume floor.
///
/// Intensity is `volume_ratio * ln(level_count) * concentration * 100`;
/// single-level zones score zero by construction.
fn zone_from_cluster(
    cluster: &[&PriceLevel],
    side: Side,
    side_total: Decimal,
    timestamp: DateTime<Utc>,
    config: &DetectorConfig,
) -> Option<PressureZone> {
    let volume: Decimal = cluster.iter().map(|level| level.quantity).sum();
    let volume_ratio = (volume / side_total).to_f64().unwrap_or(0.0);
    if volume_ratio < config.min_volume_fraction {
        return None;
    }

    let max_quantity = cluster
        .iter()
        .map(|level| level.quantity)
        .max()
        .unwrap_or(Decimal::ZERO);
    let mean_quantity = volume / Decimal::from(cluster.len());
    let concentration = if mean_quantity > Decimal::ZERO {
        (max_quantity / mean_quantity).to_f64().unwrap_or(1.0)
    } else {
        1.0
    };
    let intensity = volume_ratio * (cluster.len() as f64).ln() * concentration * 100.0;

    Some(PressureZone {
        side,
        price_start: cluster.first().map_or(Decimal::ZERO, |level| level.price),
        price_end: cluster.last().map_or(Decimal::ZERO, |level| level.price),
        volume,
        intensity,
        level_count: cluster.len(),
        timestamp,
        movement: ZoneMovement::Stable,
        movement_confidence: 0.2,
    })
}

// ============================================================================
// Movement
// ============================================================================

/// Classify a zone against similar zones in the shared history.
///
/// Similar means same side, midpoint within the tolerance and seen
/// within the lookback. Too few matches keeps the zone stable at low
/// confidence; otherwise the zone's intensity is compared to the mean
/// of the most recent matches.
fn classify_movement(
    history: &BoundedHistory<PressureZone>,
    zone: &PressureZone,
    config: &DetectorConfig,
) -> (ZoneMovement, f64) {
    let midpoint = zone.midpoint();
    if midpoint <= Decimal::ZERO {
        return (ZoneMovement::Stable, 0.2);
    }
    let cutoff = TimeDelta::from_std(config.movement_lookback)
        .ok()
        .and_then(|delta| zone.timestamp.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let matches: Vec<&PressureZone> = history
        .iter()
        .filter(|candidate| {
            candidate.side == zone.side
                && candidate.timestamp >= cutoff
                && within_tolerance(candidate.midpoint(), midpoint, config.similarity_tolerance_pct)
        })
        .collect();

    if matches.len() < config.min_similar_zones {
        return (ZoneMovement::Stable, 0.2);
    }

    let baseline_count = matches.len().min(config.baseline_zones.max(1));
    let baseline: f64 = matches
        .iter()
        .rev()
        .take(baseline_count)
        .map(|candidate| candidate.intensity)
        .sum::<f64>()
        / baseline_count as f64;

    let delta = zone.intensity - baseline;
    let movement = if delta > config.movement_delta {
        ZoneMovement::Strengthening
    } else if delta < -config.movement_delta {
        ZoneMovement::Weakening
    } else {
        ZoneMovement::Stable
    };
    let confidence = (0.3 + matches.len() as f64 * 0.1).min(0.9);
    (movement, confidence)
}

fn within_tolerance(candidate: Decimal, reference: Decimal, tolerance_pct: f64) -> bool {
    let distance_pct = ((candidate - reference) / reference * Decimal::ONE_HUNDRED)
        .abs()
        .to_f64()
        .unwrap_or(f64::MAX);
    distance_pct <= tolerance_pct
}
