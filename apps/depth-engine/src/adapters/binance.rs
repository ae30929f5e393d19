//! Binance spot depth adapter.
//!
//! Payload shape: `{"lastUpdateId": u64, "bids": [["price","qty"],..],
//! "asks": [..]}`. Levels are string-encoded; the venue sequence comes
//! from `lastUpdateId`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::adapters::{DepthHttpClient, VenueAdapter, ensure_populated, parse_level_pair};
use crate::config::VenueConfig;
use crate::error::FeedError;
use crate::models::{OrderbookSnapshot, PriceLevel};

/// Depth feed adapter for the Binance REST schema.
#[derive(Debug)]
pub struct BinanceAdapter {
    venue: String,
    symbol: String,
    native_symbol: String,
    endpoint: String,
    fallback_endpoint: Option<String>,
    depth_limit: u32,
    client: DepthHttpClient,
}

#[derive(Debug, Deserialize)]
struct BinanceDepth {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

impl BinanceAdapter {
    /// Create an adapter for one symbol on a Binance-schema endpoint.
    #[must_use]
    pub fn new(config: &VenueConfig, symbol: &str, client: DepthHttpClient) -> Self {
        Self {
            venue: config.id.clone(),
            symbol: symbol.to_string(),
            native_symbol: to_native_symbol(symbol),
            endpoint: config.endpoint.clone(),
            fallback_endpoint: config.fallback_endpoint.clone(),
            depth_limit: config.depth_limit,
            client,
        }
    }

    async fn fetch_from(&self, endpoint: &str) -> Result<OrderbookSnapshot, FeedError> {
        let query = [
            ("symbol", self.native_symbol.clone()),
            ("limit", self.depth_limit.to_string()),
        ];
        let raw: BinanceDepth = self.client.get_json(endpoint, &query).await?;
        self.parse_depth(raw)
    }

    fn parse_depth(&self, raw: BinanceDepth) -> Result<OrderbookSnapshot, FeedError> {
        let timestamp = Utc::now();
        let bids = parse_side(&raw.bids, timestamp);
        let asks = parse_side(&raw.asks, timestamp);
        ensure_populated(&bids, &asks)?;
        Ok(OrderbookSnapshot::new(
            &self.symbol,
            &self.venue,
            timestamp,
            bids,
            asks,
            Some(raw.last_update_id),
        ))
    }
}

fn parse_side(levels: &[[String; 2]], timestamp: DateTime<Utc>) -> Vec<PriceLevel> {
    levels
        .iter()
        .filter_map(|[price, quantity]| parse_level_pair(price, quantity))
        .map(|(price, quantity)| PriceLevel::new(price, quantity, timestamp))
        .collect()
}

/// Binance trades USD pairs against USDT and spells symbols without a
/// separator: `BTC-USD` -> `BTCUSDT`.
fn to_native_symbol(symbol: &str) -> String {
    let compact: String = symbol
        .chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_uppercase();
    if compact.ends_with("USD") {
        format!("{compact}T")
    } else {
        compact
    }
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> &str {
        &self.venue
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn fetch(&self) -> Result<OrderbookSnapshot, FeedError> {
        match self.fetch_from(&self.endpoint).await {
            Ok(snapshot) => Ok(snapshot),
            Err(primary_err) => match self.fallback_endpoint.as_deref() {
                Some(fallback) => {
                    debug!(
                        venue = %self.venue,
                        error = %primary_err,
                        "primary endpoint failed, trying fallback"
                    );
                    self.fetch_from(fallback).await
                }
                None => Err(primary_err),
            },
        }
    }
}
