//! Feed management: per-venue polling, resilience and quality scoring.

pub mod manager;
pub mod quality;
pub mod reconnect;

pub use manager::{FeedEvent, FeedManager};
pub use quality::QualityTracker;
pub use reconnect::ReconnectPolicy;
