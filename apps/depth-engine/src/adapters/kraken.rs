//! Kraken public depth adapter.
//!
//! Payload shape: `{"error": [..], "result": {"<PAIR>": {"bids":
//! [["price","volume",ts],..], "asks": [..]}}}`. Kraken reports errors
//! in-band through the `error` array and timestamps each level with the
//! time it last changed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::adapters::{DepthHttpClient, VenueAdapter, ensure_populated, parse_level_pair};
use crate::config::VenueConfig;
use crate::error::FeedError;
use crate::models::{OrderbookSnapshot, PriceLevel};

/// Depth feed adapter for the Kraken REST schema.
#[derive(Debug)]
pub struct KrakenAdapter {
    venue: String,
    symbol: String,
    native_pair: String,
    endpoint: String,
    fallback_endpoint: Option<String>,
    depth_limit: u32,
    client: DepthHttpClient,
}

#[derive(Debug, Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, KrakenBook>,
}

#[derive(Debug, Deserialize)]
struct KrakenBook {
    bids: Vec<(String, String, i64)>,
    asks: Vec<(String, String, i64)>,
}

impl KrakenAdapter {
    /// Create an adapter for one pair on a Kraken-schema endpoint.
    #[must_use]
    pub fn new(config: &VenueConfig, symbol: &str, client: DepthHttpClient) -> Self {
        Self {
            venue: config.id.clone(),
            symbol: symbol.to_string(),
            native_pair: to_native_pair(symbol),
            endpoint: config.endpoint.clone(),
            fallback_endpoint: config.fallback_endpoint.clone(),
            depth_limit: config.depth_limit,
            client,
        }
    }

    async fn fetch_from(&self, endpoint: &str) -> Result<OrderbookSnapshot, FeedError> {
        let query = [
            ("pair", self.native_pair.clone()),
            ("count", self.depth_limit.to_string()),
        ];
        let raw: KrakenResponse = self.client.get_json(endpoint, &query).await?;
        self.parse_response(raw)
    }

    fn parse_response(&self, raw: KrakenResponse) -> Result<OrderbookSnapshot, FeedError> {
        if !raw.error.is_empty() {
            return Err(FeedError::MalformedResponse(raw.error.join("; ")));
        }

        // Kraken canonicalizes the pair name in the result key, so take
        // the single entry rather than looking up the requested spelling.
        let book = raw
            .result
            .into_values()
            .next()
            .ok_or_else(|| FeedError::MalformedResponse("result object is empty".to_string()))?;

        let fetched_at = Utc::now();
        let bids = parse_side(&book.bids, fetched_at);
        let asks = parse_side(&book.asks, fetched_at);
        ensure_populated(&bids, &asks)?;
        Ok(OrderbookSnapshot::new(
            &self.symbol,
            &self.venue,
            fetched_at,
            bids,
            asks,
            None,
        ))
    }
}

fn parse_side(levels: &[(String, String, i64)], fetched_at: DateTime<Utc>) -> Vec<PriceLevel> {
    levels
        .iter()
        .filter_map(|(price, volume, ts)| {
            parse_level_pair(price, volume).map(|(price, quantity)| {
                let timestamp = DateTime::from_timestamp(*ts, 0).unwrap_or(fetched_at);
                PriceLevel::new(price, quantity, timestamp)
            })
        })
        .collect()
}

/// Kraken spells bitcoin `XBT` and pairs without a separator:
/// `BTC-USD` -> `XBTUSD`.
fn to_native_pair(symbol: &str) -> String {
    symbol
        .to_uppercase()
        .split('-')
        .map(|part| if part == "BTC" { "XBT" } else { part })
        .collect()
}

#[async_trait]
impl VenueAdapter for KrakenAdapter {
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
