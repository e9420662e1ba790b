use super::{BrokerError, BrokerGateway};
use crate::models::{Account, BrokerPosition, Order, OrderSide};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PAPER_API_BASE: &str = "https://paper-api.alpaca.markets";

/// Client for the Alpaca trading REST API
///
/// Defaults to the paper-trading host. The trading API wants symbols without
/// the slash (`BTCUSD`), while quotes use the slashed form (`BTC/USD`).
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    base_url: String,
    key_id: String,
    secret_key: String,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: &'a str,
    time_in_force: &'a str,
    client_order_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    client_order_id: Uuid,
    symbol: String,
    qty: String,
    side: OrderSide,
    submitted_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    buying_power: String,
    cash: String,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    symbol: String,
    qty: String,
    avg_entry_price: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Strip the slash for the trading API (`BTC/USD` -> `BTCUSD`)
pub fn trading_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

fn parse_decimal(field: &str, value: &str) -> Result<f64, BrokerError> {
    value
        .parse::<f64>()
        .map_err(|_| BrokerError::Malformed(format!("{} is not a number: {:?}", field, value)))
}

impl AlpacaClient {
    pub fn new(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self::with_base_url(key_id, secret_key, PAPER_API_BASE)
    }

    /// Point the client at a different trading host (live API, tests)
    pub fn with_base_url(
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    /// Pull the broker's error message out of a non-2xx body
    async fn rejection_reason(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ApiError>().await {
            Ok(err) => err.message,
            Err(_) => format!("HTTP {}", status),
        }
    }
}

#[async_trait]
impl BrokerGateway for AlpacaClient {
    async fn submit_market_order(
        &self,
        symbol: &str,
        qty: f64,
        side: OrderSide,
    ) -> Result<Order, BrokerError> {
        let order_symbol = trading_symbol(symbol);
        let body = OrderRequest {
            symbol: &order_symbol,
            qty: format!("{:.6}", qty),
            side,
            order_type: "market",
            time_in_force: "gtc",
            client_order_id: Uuid::new_v4(),
        };

        let response = self
            .request(reqwest::Method::POST, "/v2/orders")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BrokerError::Rejected {
                reason: Self::rejection_reason(response).await,
            });
        }

        let order: OrderResponse = response.json().await?;
        Ok(Order {
            qty: parse_decimal("qty", &order.qty)?,
            id: order.id,
            client_order_id: order.client_order_id,
            symbol: order.symbol,
            side: order.side,
            submitted_at: order.submitted_at,
        })
    }

    async fn get_account(&self) -> Result<Account, BrokerError> {
        let response = self
            .request(reqwest::Method::GET, "/v2/account")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BrokerError::Malformed(
                Self::rejection_reason(response).await,
            ));
        }

        let account: AccountResponse = response.json().await?;
        Ok(Account {
            buying_power: parse_decimal("buying_power", &account.buying_power)?,
            cash: parse_decimal("cash", &account.cash)?,
        })
    }

    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let response = self
            .request(reqwest::Method::GET, "/v2/positions")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BrokerError::Malformed(
                Self::rejection_reason(response).await,
            ));
        }

        let positions: Vec<PositionResponse> = response.json().await?;
        positions
            .into_iter()
            .map(|p| {
                Ok(BrokerPosition {
                    qty: parse_decimal("qty", &p.qty)?,
                    avg_entry_price: parse_decimal("avg_entry_price", &p.avg_entry_price)?,
                    symbol: p.symbol,
                })
            })
            .collect()
    }
}
