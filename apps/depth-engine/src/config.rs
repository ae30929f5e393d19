//! Engine configuration.
//!
//! Settings are loaded from environment variables with sensible defaults
//! for every knob; only the venue list and symbol list change behavior
//! structurally. `.env` loading happens in the binary via `dotenvy`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Venue schema and per-venue config
// ============================================================================

/// Which venue-native depth payload shape an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueSchema {
    /// `{"lastUpdateId": u64, "bids": [["p","q"],..], "asks": [..]}`.
    Binance,
    /// `{"bids": [["p","size",num_orders],..], "asks": [..], "sequence": u64}`.
    Coinbase,
    /// `{"error": [..], "result": {"<PAIR>": {"bids": [["p","v",ts],..], ..}}}`.
    Kraken,
}

impl VenueSchema {
    /// Parse a schema name, case-insensitive.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "binance" => Some(Self::Binance),
            "coinbase" => Some(Self::Coinbase),
            "kraken" => Some(Self::Kraken),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Coinbase => "coinbase",
            Self::Kraken => "kraken",
        }
    }
}

/// One venue's polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue identifier used in keys, logs and status queries.
    pub id: String,
    /// Payload schema the endpoint speaks.
    pub schema: VenueSchema,
    /// Primary depth endpoint (base URL without query parameters).
    pub endpoint: String,
    /// Alternate endpoint tried within the same fetch when the primary fails.
    #[serde(default)]
    pub fallback_endpoint: Option<String>,
    /// Poll cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Book depth requested from the venue.
    #[serde(default = "default_depth_limit")]
    pub depth_limit: u32,
}

impl VenueConfig {
    /// Binance spot depth over the public REST mirrors.
    #[must_use]
    pub fn binance() -> Self {
        Self {
            id: "binance".to_string(),
            schema: VenueSchema::Binance,
            endpoint: "https://api.binance.com/api/v3/depth".to_string(),
            fallback_endpoint: Some("https://api1.binance.com/api/v3/depth".to_string()),
            poll_interval_ms: default_poll_interval_ms(),
            depth_limit: default_depth_limit(),
        }
    }

    /// Coinbase Exchange level-2 book.
    #[must_use]
    pub fn coinbase() -> Self {
        Self {
            id: "coinbase".to_string(),
            schema: VenueSchema::Coinbase,
            endpoint: "https://api.exchange.coinbase.com/products".to_string(),
            fallback_endpoint: None,
            poll_interval_ms: default_poll_interval_ms(),
            depth_limit: default_depth_limit(),
        }
    }

    /// Kraken public depth.
    #[must_use]
    pub fn kraken() -> Self {
        Self {
            id: "kraken".to_string(),
            schema: VenueSchema::Kraken,
            endpoint: "https://api.kraken.com/0/public/Depth".to_string(),
            fallback_endpoint: None,
            poll_interval_ms: default_poll_interval_ms(),
            depth_limit: default_depth_limit(),
        }
    }

    /// Poll cadence as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

const fn default_poll_interval_ms() -> u64 {
    2_000
}

const fn default_depth_limit() -> u32 {
    50
}

// ============================================================================
// Feed and reconnect settings
// ============================================================================

/// Feed manager tuning.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Offset between consecutive venue task starts.
    pub stagger_offset: Duration,
    /// Per-request fetch timeout.
    pub fetch_timeout: Duration,
    /// Consecutive failures before a venue is demoted to FAILED.
    pub failure_threshold: u32,
    /// Book depth the completeness score measures against.
    pub expected_depth: usize,
    /// Spread as a percentage of mid considered fully plausible.
    pub max_spread_pct: f64,
    /// Cadence of the freshness decay sweep.
    pub quality_decay_interval: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            stagger_offset: Duration::from_millis(1_500),
            fetch_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            expected_depth: 50,
            max_spread_pct: 2.0,
            quality_decay_interval: Duration::from_secs(5),
        }
    }
}

/// Reconnect backoff tuning.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Multiplicative growth per attempt.
    pub multiplier: f64,
    /// Upper bound of the additive random jitter.
    pub jitter: Duration,
    /// Hard cap on any single delay.
    pub max_delay: Duration,
    /// Attempts before the venue is declared permanently failed.
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: Duration::from_millis(250),
            max_delay: Duration::from_secs(60),
            max_attempts: 8,
        }
    }
}

// ============================================================================
// Engine config
// ============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Symbols polled on every venue, venue-agnostic spelling.
    pub symbols: Vec<String>,
    /// Venues to poll.
    pub venues: Vec<VenueConfig>,
    /// Feed manager tuning.
    pub feed: FeedSettings,
    /// Reconnect backoff tuning.
    pub reconnect: ReconnectSettings,
    /// Snapshot broadcast channel capacity.
    pub channel_capacity: usize,
    /// Cadence of the periodic status log in the binary.
    pub status_log_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC-USD".to_string()],
            venues: vec![
                VenueConfig::binance(),
                VenueConfig::coinbase(),
                VenueConfig::kraken(),
            ],
            feed: FeedSettings::default(),
            reconnect: ReconnectSettings::default(),
            channel_capacity: 1_024,
            status_log_interval: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `DEPTH_VENUES` names an unknown venue or
    /// resolves to an empty set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let symbols = std::env::var("DEPTH_SYMBOLS")
            .map(|raw| parse_symbol_list(&raw))
            .unwrap_or_default();
        let symbols = if symbols.is_empty() {
            defaults.symbols
        } else {
            symbols
        };

        let venues = match std::env::var("DEPTH_VENUES") {
            Ok(raw) => resolve_venues(&raw)?,
            Err(_) => defaults.venues,
        };
        if venues.is_empty() {
            return Err(ConfigError::NoVenues);
        }

        let poll_interval_ms =
            parse_env_u64("DEPTH_POLL_INTERVAL_MS", default_poll_interval_ms());
        let depth_limit = parse_env_u32("DEPTH_LIMIT", default_depth_limit());
        let venues = venues
            .into_iter()
            .map(|mut v| {
                v.poll_interval_ms = poll_interval_ms;
                v.depth_limit = depth_limit;
                v
            })
            .collect();

        let feed = FeedSettings {
            stagger_offset: parse_env_duration_millis(
                "DEPTH_STAGGER_OFFSET_MS",
                defaults.feed.stagger_offset,
            ),
            fetch_timeout: parse_env_duration_millis(
                "DEPTH_FETCH_TIMEOUT_MS",
                defaults.feed.fetch_timeout,
            ),
            failure_threshold: parse_env_u32(
                "DEPTH_FAILURE_THRESHOLD",
                defaults.feed.failure_threshold,
            ),
            expected_depth: parse_env_usize("DEPTH_EXPECTED_DEPTH", defaults.feed.expected_depth),
            max_spread_pct: parse_env_f64("DEPTH_MAX_SPREAD_PCT", defaults.feed.max_spread_pct),
            quality_decay_interval: parse_env_duration_secs(
                "DEPTH_QUALITY_DECAY_INTERVAL_SECS",
                defaults.feed.quality_decay_interval,
            ),
        };

        let reconnect = ReconnectSettings {
            initial_delay: parse_env_duration_millis(
                "DEPTH_RECONNECT_INITIAL_DELAY_MS",
                defaults.reconnect.initial_delay,
            ),
            multiplier: parse_env_f64(
                "DEPTH_RECONNECT_MULTIPLIER",
                defaults.reconnect.multiplier,
            ),
            jitter: parse_env_duration_millis(
                "DEPTH_RECONNECT_JITTER_MS",
                defaults.reconnect.jitter,
            ),
            max_delay: parse_env_duration_secs(
                "DEPTH_RECONNECT_MAX_DELAY_SECS",
                defaults.reconnect.max_delay,
            ),
            max_attempts: parse_env_u32(
                "DEPTH_RECONNECT_MAX_ATTEMPTS",
                defaults.reconnect.max_attempts,
            ),
        };

        Ok(Self {
            symbols,
            venues,
            feed,
            reconnect,
            channel_capacity: parse_env_usize("DEPTH_CHANNEL_CAPACITY", defaults.channel_capacity),
            status_log_interval: parse_env_duration_secs(
                "DEPTH_STATUS_LOG_INTERVAL_SECS",
                defaults.status_log_interval,
            ),
        })
    }
}

fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn resolve_venues(raw: &str) -> Result<Vec<VenueConfig>, ConfigError> {
    let mut venues = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let venue = match VenueSchema::from_str_case_insensitive(id) {
            Some(VenueSchema::Binance) => VenueConfig::binance(),
            Some(VenueSchema::Coinbase) => VenueConfig::coinbase(),
            Some(VenueSchema::Kraken) => VenueConfig::kraken(),
            None => {
                return Err(ConfigError::InvalidValue {
                    key: "DEPTH_VENUES".to_string(),
                    value: id.to_string(),
                });
            }
        };
        venues.push(venue);
    }
    Ok(venues)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
