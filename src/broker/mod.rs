// Brokerage gateway: order submission, account and position queries
pub mod alpaca;
#[cfg(test)]
pub(crate) mod paper;

pub use alpaca::AlpacaClient;

use crate::models::{Account, BrokerPosition, Order, OrderSide};
use async_trait::async_trait;

/// Failure classes at the brokerage boundary
///
/// `Transport` failures are worth retrying on a later cycle; `Rejected`
/// orders are not, the order itself was refused.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("order rejected by broker: {reason}")]
    Rejected { reason: String },

    #[error("unexpected broker response: {0}")]
    Malformed(String),
}

/// Synchronous capability surface of the brokerage
///
/// Calls are awaited one at a time from the decision cycle; implementations
/// must be shareable across the controller and the balance refresher.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Submit a good-till-canceled market order
    async fn submit_market_order(
        &self,
        symbol: &str,
        qty: f64,
        side: OrderSide,
    ) -> Result<Order, BrokerError>;

    async fn get_account(&self) -> Result<Account, BrokerError>;

    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;
}

// A shared gateway is a gateway; lets the controller and the balance
// refresher hold the same client without cloning it
#[async_trait]
impl<T: BrokerGateway + ?Sized> BrokerGateway for std::sync::Arc<T> {
    async fn submit_market_order(
        &self,
        symbol: &str,
        qty: f64,
        side: OrderSide,
    ) -> Result<Order, BrokerError> {
        (**self).submit_market_order(symbol, qty, side).await
    }

    async fn get_account(&self) -> Result<Account, BrokerError> {
        (**self).get_account().await
    }

    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        (**self).get_open_positions().await
    }
}
