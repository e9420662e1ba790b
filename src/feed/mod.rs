// Quote feed: subscription capability and the reconnecting supervisor
pub mod alpaca;
pub mod supervisor;

pub use alpaca::AlpacaQuoteFeed;
pub use supervisor::{FeedSupervisor, ReconnectBackoff};

use crate::models::Quote;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Failure classes at the feed boundary; all of them are retried with
/// backoff by the supervisor
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("feed subscription failed: {0}")]
    Subscribe(String),
}

/// Capability to subscribe to one symbol's quote stream
///
/// The stream ends when the returned channel closes, whatever the cause; the
/// caller is expected to resubscribe. Implementations never interpret quotes.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    async fn subscribe(&self, symbol: &str) -> Result<mpsc::Receiver<Quote>, FeedError>;
}
