//! Venue feed adapters.
//!
//! One adapter per venue payload schema, all implementing [`VenueAdapter`].
//! An adapter performs exactly one fetch+parse+validate cycle per call;
//! retry scheduling and state transitions belong to the feed manager.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::config::{VenueConfig, VenueSchema};
use crate::error::FeedError;
use crate::models::OrderbookSnapshot;

pub mod binance;
pub mod coinbase;
pub mod kraken;
pub mod mock;

pub use binance::BinanceAdapter;
pub use coinbase::CoinbaseAdapter;
pub use kraken::KrakenAdapter;
pub use mock::MockVenueAdapter;

/// Maximum number of response body characters echoed into error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// A single venue's depth feed, bound to one symbol.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue identifier used in keys, logs and status queries.
    fn venue(&self) -> &str;

    /// Venue-agnostic symbol this adapter polls.
    fn symbol(&self) -> &str;

    /// One fetch+parse+validate cycle.
    ///
    /// Tries the primary endpoint, then the fallback endpoint (when
    /// configured) within the same call. No internal retry loop.
    ///
    /// # Errors
    ///
    /// [`FeedError::Network`] on transport or HTTP status failures,
    /// [`FeedError::MalformedResponse`] when the payload does not parse,
    /// [`FeedError::EmptyBook`] when no valid level survives on either side.
    async fn fetch(&self) -> Result<OrderbookSnapshot, FeedError>;
}

/// Shared HTTP client for depth endpoints.
#[derive(Debug, Clone)]
pub struct DepthHttpClient {
    client: reqwest::Client,
}

impl DepthHttpClient {
    /// Build a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Network`] if the underlying client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("depth-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// GET `url` with `query` parameters and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Non-2xx statuses map to [`FeedError::Network`] with the status and a
    /// truncated body; decode failures map to [`FeedError::MalformedResponse`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let response = self.client.get(url).query(query).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let raw = response.text().await.unwrap_or_default();
            // Char-based cut: byte truncation can split a UTF-8 sequence.
            let body: String = raw.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(FeedError::Network(format!("{url} returned {status}: {body}")));
        }

        Ok(response.json::<T>().await?)
    }
}

/// Build the adapter matching a venue's configured schema.
#[must_use]
pub fn build_adapter(
    config: &VenueConfig,
    symbol: &str,
    client: DepthHttpClient,
) -> Arc<dyn VenueAdapter> {
    match config.schema {
        VenueSchema::Binance => Arc::new(BinanceAdapter::new(config, symbol, client)),
        VenueSchema::Coinbase => Arc::new(CoinbaseAdapter::new(config, symbol, client)),
        VenueSchema::Kraken => Arc::new(KrakenAdapter::new(config, symbol, client)),
    }
}

/// Parse a venue's string-encoded price/quantity pair, discarding
/// non-numeric and non-positive values.
pub(crate) fn parse_level_pair(price: &str, quantity: &str) -> Option<(Decimal, Decimal)> {
    let price: Decimal = price.trim().parse().ok()?;
    let quantity: Decimal = quantity.trim().parse().ok()?;
    if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
        return None;
    }
    Some((price, quantity))
}

/// `EmptyBook` when both sides came out empty after filtering.
pub(crate) fn ensure_populated(
    bids: &[crate::models::PriceLevel],
    asks: &[crate::models::PriceLevel],
) -> Result<(), FeedError> {
    if bids.is_empty() && asks.is_empty() {
        return Err(FeedError::EmptyBook);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::models::PriceLevel;

    #[test]
    fn level_pair_parses_positive_values() {
        assert_eq!(
            parse_level_pair("100.5", "2.25"),
            Some((dec!(100.5), dec!(2.25)))
        );
    }

    #[test]
    fn level_pair_discards_garbage_and_non_positive() {
        assert_eq!(parse_level_pair("abc", "1"), None);
        assert_eq!(parse_level_pair("100", "NaN"), None);
        assert_eq!(parse_level_pair("0", "1"), None);
        assert_eq!(parse_level_pair("100", "-2"), None);
        assert_eq!(parse_level_pair("", ""), None);
    }

    #[test]
    fn populated_check_requires_one_side() {
        let level = PriceLevel::new(dec!(100), dec!(1), Utc::now());
        assert!(ensure_populated(&[level.clone()], &[]).is_ok());
        assert!(ensure_populated(&[], &[level]).is_ok());
        assert!(matches!(
            ensure_populated(&[], &[]),
            Err(FeedError::EmptyBook)
        ));
    }

    #[tokio::test]
    async fn http_error_body_is_cut_per_character() {
        let server = MockServer::start().await;
        // Multi-byte fill: a byte-indexed cut would land inside a char.
        let body = format!("a{}", "é".repeat(250));
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string(body))
            .mount(&server)
            .await;

        let client = DepthHttpClient::new(Duration::from_secs(2)).unwrap();
        let err = client
            .get_json::<serde_json::Value>(&server.uri(), &[])
            .await
            .unwrap_err();

        let FeedError::Network(message) = err else {
            panic!("expected a network error, got {err}");
        };
        assert!(message.contains("500"));
        assert_eq!(message.chars().filter(|c| *c == 'é').count(), 199);
    }
}
