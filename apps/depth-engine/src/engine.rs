//! Engine facade wiring the feed, analytics and zone detection.
//!
//! [`DepthEngine`] owns the feed manager plus two consumers of its
//! broadcast stream: one feeds the zone detector, the other stores
//! snapshots in the processor together with the detector's latest zones
//! for that book. The consumers hold independent receivers, so their
//! views may diverge briefly; queries always reflect at-most-latest
//! ingested state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::VenueAdapter;
use crate::analytics::{
    HistoricalPoint, MarketImpact, MergedOrderbook, OrderbookProcessor, Prediction,
    ProcessorConfig, SpreadAnalysis, VolumeProfile,
};
use crate::config::EngineConfig;
use crate::feed::{FeedEvent, FeedManager};
use crate::models::{OrderbookSnapshot, Side, VenueStatus};
use crate::zones::{DetectorConfig, PressureZone, PressureZoneDetector};

/// Facade over the feed manager, orderbook processor and zone detector.
pub struct DepthEngine {
    manager: FeedManager,
    processor: Arc<OrderbookProcessor>,
    detector: Arc<PressureZoneDetector>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl DepthEngine {
    /// Create an engine with default analytics tuning.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_analytics(config, ProcessorConfig::default(), DetectorConfig::default())
    }

    /// Create an engine with explicit analytics tuning.
    #[must_use]
    pub fn with_analytics(
        config: &EngineConfig,
        processor: ProcessorConfig,
        detector: DetectorConfig,
    ) -> Self {
        Self {
            manager: FeedManager::new(
                config.feed.clone(),
                config.reconnect.clone(),
                config.channel_capacity,
            ),
            processor: Arc::new(OrderbookProcessor::new(processor)),
            detector: Arc::new(PressureZoneDetector::new(detector)),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a venue with its adapters (one per symbol).
    pub fn add_venue(
        &self,
        venue: impl Into<String>,
        adapters: Vec<Arc<dyn VenueAdapter>>,
        poll_interval: Duration,
    ) {
        self.manager.add_venue(venue, adapters, poll_interval);
    }

    /// Spawn the consumer tasks and start polling all venues.
    ///
    /// Calling `start` twice is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("engine already started");
            return;
        }

        self.spawn_detector_consumer();
        self.spawn_processor_consumer();
        self.manager.start();
        info!("depth engine started");
    }

    /// Stop polling and the consumer tasks. Idempotent.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            debug!("engine shutdown already requested");
            return;
        }
        self.cancel.cancel();
        self.manager.shutdown();
        info!("depth engine stopped");
    }

    /// Subscribe to the raw feed event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.manager.subscribe()
    }

    /// Latest stored snapshot per symbol for a venue.
    #[must_use]
    pub fn venue_data(&self, venue: &str) -> Vec<OrderbookSnapshot> {
        self.processor.latest_for_venue(venue)
    }

    /// Latest zones detected for a book.
    #[must_use]
    pub fn pressure_zones(&self, venue: &str, symbol: &str) -> Vec<PressureZone> {
        self.detector.zones_for(venue, symbol)
    }

    /// Consolidated book across venues for a symbol.
    #[must_use]
    pub fn merged_orderbook(&self, symbol: &str, venues: &[String]) -> Option<MergedOrderbook> {
        self.processor.merged_orderbook(symbol, venues)
    }

    /// Retained history for a book no older than `range`.
    #[must_use]
    pub fn historical_snapshots(
        &self,
        venue: &str,
        symbol: &str,
        range: Duration,
    ) -> Vec<HistoricalPoint> {
        self.processor.historical_snapshots(venue, symbol, range)
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
        self.processor.volume_profile(venue, symbol, range, price_step)
    }

    /// Spread statistics for a book.
    #[must_use]
    pub fn spread_analysis(&self, venue: &str, symbol: &str) -> Option<SpreadAnalysis> {
        self.processor.spread_analysis(venue, symbol)
    }

    /// Market impact estimate against the book's latest snapshot.
    #[must_use]
    pub fn market_impact(
        &self,
        venue: &str,
        symbol: &str,
        size: Decimal,
        side: Side,
    ) -> Option<MarketImpact> {
        self.processor.market_impact(venue, symbol, size, side)
    }

    /// Short-horizon direction score for a book.
    #[must_use]
    pub fn prediction(&self, venue: &str, symbol: &str, horizon: Duration) -> Prediction {
        self.processor.prediction(venue, symbol, horizon)
    }

    /// Connection and quality status for one venue.
    #[must_use]
    pub fn venue_status(&self, venue: &str) -> Option<VenueStatus> {
        self.manager.venue_status(venue)
    }

    /// Status for every registered venue.
    #[must_use]
    pub fn all_statuses(&self) -> Vec<VenueStatus> {
        self.manager.all_statuses()
    }

    /// Direct access to the orderbook processor.
    #[must_use]
    pub fn processor(&self) -> &OrderbookProcessor {
        &self.processor
    }

    /// Direct access to the zone detector.
    #[must_use]
    pub fn detector(&self) -> &PressureZoneDetector {
        &self.detector
    }

    fn spawn_detector_consumer(&self) {
        let detector = Arc::clone(&self.detector);
        let mut events = self.manager.subscribe();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(FeedEvent::Snapshot(snapshot)) => {
                            let zones = detector.detect(&snapshot);
                            debug!(
                                venue = %snapshot.venue,
                                symbol = %snapshot.symbol,
                                zones = zones.len(),
                                "zones detected"
                            );
                        }
                        Ok(FeedEvent::StateChanged { .. }) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "zone consumer lagged behind the feed");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    fn spawn_processor_consumer(&self) {
        let processor = Arc::clone(&self.processor);
        let detector = Arc::clone(&self.detector);
        let mut events = self.manager.subscribe();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(FeedEvent::Snapshot(snapshot)) => {
                            let zones = detector.zones_for(&snapshot.venue, &snapshot.symbol);
                            processor.ingest(&snapshot, zones);
                        }
                        Ok(FeedEvent::StateChanged { .. }) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "history consumer lagged behind the feed");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }
}

impl std::fmt::Debug for DepthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthEngine")
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("subscribers", &self.manager.receiver_count())
            .finish_non_exhaustive()
    }
}
