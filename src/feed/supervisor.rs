use super::QuoteFeed;
use crate::broker::BrokerGateway;
use crate::engine::controller::PositionController;
use crate::models::Quote;
use crate::state::{SharedState, Shutdown};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 10;

/// Exponential backoff between reconnect attempts
///
/// Deterministic doubling: 1, 2, 4, ... capped at the max delay.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max_delay: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            attempt: 0,
        }
    }

    /// Next delay to wait; increments the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.max_delay);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Call after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

/// Owns the quote subscription for one symbol and keeps it alive
///
/// Transient failures are retried with backoff; exhausting the retry budget
/// stops the whole engine through the shared stop signal. The supervisor
/// never talks to the brokerage itself.
pub struct FeedSupervisor<F, B> {
    feed: F,
    controller: PositionController<B>,
    state: Arc<SharedState>,
    shutdown: Arc<Shutdown>,
}

impl<F, B> FeedSupervisor<F, B>
where
    F: QuoteFeed,
    B: BrokerGateway,
{
    pub fn new(
        feed: F,
        controller: PositionController<B>,
        state: Arc<SharedState>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            feed,
            controller,
            state,
            shutdown,
        }
    }

    /// Subscribe-and-pump until the engine stops or the retry budget runs out
    pub async fn run(mut self, symbol: &str) {
        let mut backoff = ReconnectBackoff::default();

        loop {
            if self.shutdown.is_stopped() {
                break;
            }

            match self.feed.subscribe(symbol).await {
                Ok(mut quotes) => {
                    tracing::info!("📡 Subscribed to {} quote stream", symbol);
                    backoff.reset();
                    self.pump(&mut quotes).await;
                    if self.shutdown.is_stopped() {
                        break;
                    }
                    tracing::warn!("Quote stream for {} ended", symbol);
                }
                Err(e) => {
                    tracing::error!("Failed to subscribe to {}: {}", symbol, e);
                }
            }

            if self.shutdown.is_stopped() {
                break;
            }
            if backoff.attempt() >= MAX_RETRIES {
                tracing::error!(
                    "Maximum reconnection attempts ({}) reached. Stopping engine.",
                    MAX_RETRIES
                );
                self.state.mark_stopped();
                self.shutdown.trigger();
                break;
            }

            let delay = backoff.next_delay();
            tracing::warn!(
                "Reconnecting to {} in {:?} (attempt {}/{})",
                symbol,
                delay,
                backoff.attempt(),
                MAX_RETRIES
            );
            sleep(delay).await;
        }

        tracing::info!("Feed supervisor for {} exited", symbol);
    }

    /// Forward quotes in arrival order until the stream ends or the engine
    /// stops; one decision cycle at a time
    async fn pump(&mut self, quotes: &mut mpsc::Receiver<Quote>) {
        loop {
            tokio::select! {
                _ = self.shutdown.wait() => return,
                quote = quotes.recv() => match quote {
                    Some(quote) => self.controller.on_quote(quote).await,
                    None => return,
                },
            }
        }
    }
}
