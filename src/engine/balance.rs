use crate::broker::BrokerGateway;
use crate::state::{SharedState, Shutdown};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior};

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Keeps the observable account balance approximately fresh
///
/// Fixed 60-second cadence; an error just waits for the next tick, the
/// period itself is the retry interval.
pub struct BalanceRefresher<B> {
    broker: B,
    state: Arc<SharedState>,
    shutdown: Arc<Shutdown>,
}

impl<B: BrokerGateway> BalanceRefresher<B> {
    pub fn new(broker: B, state: Arc<SharedState>, shutdown: Arc<Shutdown>) -> Self {
        Self {
            broker,
            state,
            shutdown,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = ticker.tick() => self.refresh().await,
            }
        }

        tracing::debug!("Balance refresher exited");
    }

    async fn refresh(&self) {
        match self.broker.get_account().await {
            Ok(account) => {
                tracing::debug!("Account balance refreshed: ${:.2}", account.cash);
                self.state.set_balance(account.cash);
            }
            Err(e) => {
                tracing::warn!("Failed to refresh account balance: {}", e);
            }
        }
    }
}
