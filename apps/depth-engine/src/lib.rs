// Allow unwrap/expect and test-only patterns in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Depth Engine - Market Depth Analytics Core
//!
//! Ingests live order book depth from multiple trading venues over their
//! public REST endpoints, reconciles the payloads into a canonical
//! per-venue time series, and derives real-time microstructure analytics.
//!
//! # Layers (inside → outside)
//!
//! - **Models**: canonical book types shared by every layer
//!   - `models`: [`OrderbookSnapshot`], [`PriceLevel`], [`BookKey`], venue status
//!
//! - **Ingestion**: venue polling with failure isolation
//!   - `adapters`: per-venue payload parsing behind the [`VenueAdapter`] trait
//!   - `feed`: poll scheduling, reconnect backoff, quality scoring, broadcast
//!
//! - **Analytics**: pure derivations over retained history
//!   - `analytics`: bounded history, spread statistics, volume profile,
//!     market impact, directional scores
//!   - `zones`: liquidity pressure zones, depth imbalance, heatmap grids
//!
//! - **Engine**: the composition root
//!   - `engine`: [`DepthEngine`] facade owning the feed and both consumers
//!   - `config`: environment-driven [`EngineConfig`]

// =============================================================================
// Modules
// =============================================================================

/// Venue feed adapters and the shared HTTP client.
pub mod adapters;

/// History retention and microstructure analytics.
pub mod analytics;

/// Environment-driven configuration.
pub mod config;

/// Engine facade wiring feed, analytics and zones together.
pub mod engine;

/// Error types.
pub mod error;

/// Feed manager, reconnect policy and quality scoring.
pub mod feed;

/// Canonical order book model.
pub mod models;

/// Tracing subscriber setup.
pub mod telemetry;

/// Pressure zone detection, depth imbalance and heatmaps.
pub mod zones;

// =============================================================================
// Re-exports
// =============================================================================

// Model re-exports
pub use models::{
    BookKey, DataQualityRecord, OrderbookSnapshot, PriceLevel, Side, VenueConnectionState,
    VenueStatus,
};

// Ingestion re-exports
pub use adapters::{DepthHttpClient, VenueAdapter, build_adapter};
pub use error::{ConfigError, FeedError};
pub use feed::{FeedEvent, FeedManager};

// Analytics re-exports
pub use analytics::{
    MarketImpact, MergedOrderbook, OrderbookProcessor, Prediction, ProcessorConfig,
    SpreadAnalysis, VolumeProfile,
};
pub use zones::{DetectorConfig, PressureZone, PressureZoneDetector, ZoneMovement};

// Engine re-exports
pub use config::EngineConfig;
pub use engine::DepthEngine;
