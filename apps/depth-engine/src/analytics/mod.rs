//! Orderbook analytics: retained history and derived statistics.
//!
//! Everything here is driven by one consumer of the feed broadcast
//! calling [`OrderbookProcessor::ingest`]; queries are pure reads over
//! bounded rings. Sparse data degrades results (explicit flags, `None`),
//! it never errors.

pub mod history;
pub mod impact;
pub mod prediction;
pub mod processor;
pub mod profile;
pub mod spread;

pub use history::{BoundedHistory, HistoricalPoint, SpreadSample};
pub use impact::MarketImpact;
pub use prediction::{FeatureSet, MarketSample, Prediction};
pub use processor::{
    CumulativeDepth, DepthPoint, HistoryStats, MergedOrderbook, OrderbookProcessor,
    ProcessorConfig,
};
pub use profile::{VolumeProfile, VolumeProfileBucket};
pub use spread::{SpreadAnalysis, SpreadTightness, SpreadTrend};
