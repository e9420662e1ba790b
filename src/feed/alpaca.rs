use super::{FeedError, QuoteFeed};
use crate::models::Quote;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

const DATA_API_BASE: &str = "https://data.alpaca.markets";
const CHANNEL_CAPACITY: usize = 64;
// Polls tolerated before the stream is declared dead and handed back to the
// supervisor for a fresh subscription
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Quote feed over the Alpaca crypto data REST API
///
/// Polls the latest-quote endpoint on a fixed cadence and pushes each
/// observed bid into the subscription channel. Persistent transport failures
/// close the channel, which the supervisor treats as a disconnect.
#[derive(Clone)]
pub struct AlpacaQuoteFeed {
    client: Client,
    base_url: String,
    key_id: String,
    secret_key: String,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct LatestQuotesResponse {
    quotes: HashMap<String, LatestQuote>,
}

#[derive(Debug, Deserialize)]
struct LatestQuote {
    #[serde(rename = "bp")]
    bid_price: f64,
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
}

impl AlpacaQuoteFeed {
    pub fn new(
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self::with_base_url(key_id, secret_key, poll_interval, DATA_API_BASE)
    }

    pub fn with_base_url(
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
        poll_interval: Duration,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
            poll_interval,
        }
    }

    async fn fetch_latest(&self, symbol: &str) -> Result<Quote, FeedError> {
        let url = format!("{}/v1beta3/crypto/us/latest/quotes", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("symbols", symbol)])
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .send()
            .await?
            .error_for_status()?;

        let body: LatestQuotesResponse = response.json().await?;
        let quote = body
            .quotes
            .get(symbol)
            .ok_or_else(|| FeedError::Subscribe(format!("no quote for symbol {}", symbol)))?;

        Ok(Quote {
            symbol: symbol.to_string(),
            bid_price: quote.bid_price,
            timestamp: quote.timestamp,
        })
    }
}

#[async_trait]
impl QuoteFeed for AlpacaQuoteFeed {
    async fn subscribe(&self, symbol: &str) -> Result<mpsc::Receiver<Quote>, FeedError> {
        // Fail the subscription up front if the endpoint is unreachable, so
        // the supervisor backs off instead of pumping an instantly-dead stream
        let first = self.fetch_latest(symbol).await?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        if tx.try_send(first).is_err() {
            return Err(FeedError::Subscribe("subscriber went away".to_string()));
        }

        let feed = self.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            let mut consecutive_failures = 0u32;
            loop {
                sleep(feed.poll_interval).await;

                match feed.fetch_latest(&symbol).await {
                    Ok(quote) => {
                        consecutive_failures = 0;
                        if tx.send(quote).await.is_err() {
                            // Receiver dropped; subscription is over
                            return;
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        tracing::warn!(
                            "Quote poll for {} failed ({}/{}): {}",
                            symbol,
                            consecutive_failures,
                            MAX_CONSECUTIVE_FAILURES,
                            e
                        );
                        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                            // Dropping the sender closes the stream
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTE_BODY: &str = r#"{
        "quotes": {
            "BTC/USD": {
                "ap": 59010.5, "as": 0.5,
                "bp": 59000.0, "bs": 0.4,
                "t": "2024-11-02T15:04:05.123456789Z"
            }
        }
    }"#;

    fn test_feed(server: &mockito::ServerGuard, poll_ms: u64) -> AlpacaQuoteFeed {
        AlpacaQuoteFeed::with_base_url(
            "test-key",
            "test-secret",
            Duration::from_millis(poll_ms),
            server.url(),
        )
    }

    #[tokio::test]
    async fn test_fetch_latest_parses_bid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1beta3/crypto/us/latest/quotes")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbols".into(),
                "BTC/USD".into(),
            ))
            .with_status(200)
            .with_body(QUOTE_BODY)
            .create_async()
            .await;

        let feed = test_feed(&server, 1000);
        let quote = feed.fetch_latest("BTC/USD").await.unwrap();

        assert_eq!(quote.symbol, "BTC/USD");
        assert_eq!(quote.bid_price, 59000.0);
    }

    #[tokio::test]
    async fn test_subscribe_fails_fast_when_unreachable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1beta3/crypto/us/latest/quotes")
            .with_status(500)
            .create_async()
            .await;

        let feed = test_feed(&server, 10);
        assert!(feed.subscribe("BTC/USD").await.is_err());
    }

    #[tokio::test]
    async fn test_subscribe_streams_then_closes_on_persistent_failure() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1beta3/crypto/us/latest/quotes")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(QUOTE_BODY)
            .create_async()
            .await;

        let feed = test_feed(&server, 10);
        let mut rx = feed.subscribe("BTC/USD").await.unwrap();

        // Initial quote plus at least one polled quote
        let first = rx.recv().await.unwrap();
        assert_eq!(first.bid_price, 59000.0);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.bid_price, 59000.0);

        // Endpoint goes dark; after three failed polls the channel closes
        mock.remove_async().await;
        while rx.recv().await.is_some() {}
    }
}
