use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single price update for the traded symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub bid_price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle state of the engine, as seen by observers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BotStatus {
    Initializing,
    WaitingToEnter,
    InPosition,
    Stopped,
}

/// The currently held position
///
/// Exists only between a successful BUY fill and a successful SELL fill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
}

/// One point of the unrealized-PnL history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PnlPoint {
    pub timestamp: DateTime<Utc>,
    pub pnl: f64,
}

/// Read-only copy of the engine state handed to observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSnapshot {
    pub status: BotStatus,
    pub latest_price: Option<f64>,
    pub account_balance: Option<f64>,
    pub position: Option<Position>,
    pub pnl: f64,
    pub pnl_history: Vec<PnlPoint>,
    pub execute_trade_requested: bool,
}

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Accepted order as reported by the brokerage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_order_id: Uuid,
    pub symbol: String,
    pub qty: f64,
    pub side: OrderSide,
    pub submitted_at: DateTime<Utc>,
}

/// Account balances relevant to position sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub buying_power: f64,
    pub cash: f64,
}

/// An open position as reported by the brokerage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: f64,
    pub avg_entry_price: f64,
}
