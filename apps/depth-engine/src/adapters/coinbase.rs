//! Coinbase Exchange level-2 book adapter.
//!
//! Payload shape: `{"sequence": u64, "bids": [["price","size",num_orders],..],
//! "asks": [..]}`. The third element of each level is the resting order
//! count, carried into [`PriceLevel::order_count`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::adapters::{DepthHttpClient, VenueAdapter, ensure_populated, parse_level_pair};
use crate::config::VenueConfig;
use crate::error::FeedError;
use crate::models::{OrderbookSnapshot, PriceLevel};

/// Depth feed adapter for the Coinbase Exchange REST schema.
#[derive(Debug)]
pub struct CoinbaseAdapter {
    venue: String,
    symbol: String,
    product_id: String,
    endpoint: String,
    fallback_endpoint: Option<String>,
    client: DepthHttpClient,
}

#[derive(Debug, Deserialize)]
struct CoinbaseBook {
    sequence: u64,
    bids: Vec<(String, String, u32)>,
    asks: Vec<(String, String, u32)>,
}

impl CoinbaseAdapter {
    /// Create an adapter for one product on a Coinbase-schema endpoint.
    #[must_use]
    pub fn new(config: &VenueConfig, symbol: &str, client: DepthHttpClient) -> Self {
        Self {
            venue: config.id.clone(),
            symbol: symbol.to_string(),
            // Canonical symbols already use Coinbase's product spelling.
            product_id: symbol.to_uppercase(),
            endpoint: config.endpoint.clone(),
            fallback_endpoint: config.fallback_endpoint.clone(),
            client,
        }
    }

    async fn fetch_from(&self, endpoint: &str) -> Result<OrderbookSnapshot, FeedError> {
        let url = format!("{endpoint}/{}/book", self.product_id);
        let query = [("level", "2".to_string())];
        let raw: CoinbaseBook = self.client.get_json(&url, &query).await?;
        self.parse_book(raw)
    }

    fn parse_book(&self, raw: CoinbaseBook) -> Result<OrderbookSnapshot, FeedError> {
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
            Some(raw.sequence),
        ))
    }
}

fn parse_side(levels: &[(String, String, u32)], timestamp: DateTime<Utc>) -> Vec<PriceLevel> {
    levels
        .iter()
        .filter_map(|(price, size, orders)| {
            parse_level_pair(price, size)
                .map(|(price, quantity)| {
                    PriceLevel::new(price, quantity, timestamp).with_order_count(*orders)
                })
        })
        .collect()
}

#[async_trait]
impl VenueAdapter for CoinbaseAdapter {
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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::VenueSchema;

    fn test_adapter(endpoint: &str) -> CoinbaseAdapter {
        let config = VenueConfig {
            id: "coinbase".to_string(),
            schema: VenueSchema::Coinbase,
            endpoint: endpoint.to_string(),
            fallback_endpoint: None,
            poll_interval_ms: 2_000,
            depth_limit: 50,
        };
        let client = DepthHttpClient::new(Duration::from_secs(2)).unwrap();
        CoinbaseAdapter::new(&config, "btc-usd", client)
    }

    fn book_body() -> serde_json::Value {
        json!({
            "sequence": 3_421_199,
            "bids": [["50000.00", "1.25", 4], ["50001.50", "0.80", 1]],
            "asks": [["50003.00", "0.40", 2], ["50002.25", "2.10", 7]]
        })
    }

    #[test]
    fn parse_carries_order_counts_and_sorts() {
        let adapter = test_adapter("http://unused.invalid/products");
        let raw: CoinbaseBook = serde_json::from_value(book_body()).unwrap();

        let snapshot = adapter.parse_book(raw).unwrap();

        assert_eq!(snapshot.sequence, Some(3_421_199));
        let best_bid = snapshot.best_bid().unwrap();
        assert_eq!(best_bid.price, dec!(50001.50));
        assert_eq!(best_bid.order_count, Some(1));
        let best_ask = snapshot.best_ask().unwrap();
        assert_eq!(best_ask.price, dec!(50002.25));
        assert_eq!(best_ask.order_count, Some(7));
    }

    #[test]
    fn parse_rejects_fully_empty_book() {
        let adapter = test_adapter("http://unused.invalid/products");
        let raw: CoinbaseBook = serde_json::from_value(json!({
            "sequence": 1,
            "bids": [],
            "asks": []
        }))
        .unwrap();

        assert!(matches!(adapter.parse_book(raw), Err(FeedError::EmptyBook)));
    }

    #[tokio::test]
    async fn fetch_requests_the_product_book_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/BTC-USD/book"))
            .and(query_param("level", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(book_body()))
            .mount(&server)
            .await;

        let adapter = test_adapter(&format!("{}/products", server.uri()));
        let snapshot = adapter.fetch().await.unwrap();

        assert_eq!(snapshot.symbol, "btc-usd");
        assert_eq!(snapshot.venue, "coinbase");
        assert_eq!(snapshot.bids.len(), 2);
    }

    #[tokio::test]
    async fn fetch_maps_http_error_to_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let adapter = test_adapter(&format!("{}/products", server.uri()));
        let err = adapter.fetch().await.unwrap_err();

        assert!(matches!(err, FeedError::Network(_)));
        assert!(err.to_string().contains("429"));
    }
}
