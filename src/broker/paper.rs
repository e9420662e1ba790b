//! In-memory brokerage for tests: fills every market order instantly unless
//! told to reject, and hands back whatever account/position fixtures the
//! test installed.

use super::{BrokerError, BrokerGateway};
use crate::models::{Account, BrokerPosition, Order, OrderSide};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

struct PaperState {
    buying_power: f64,
    cash: f64,
    positions: Vec<BrokerPosition>,
    orders: Vec<Order>,
    reject_orders: bool,
    fail_account: bool,
    fail_positions: bool,
}

pub struct PaperBroker {
    inner: Mutex<PaperState>,
}

impl PaperBroker {
    pub fn new(buying_power: f64) -> Self {
        Self {
            inner: Mutex::new(PaperState {
                buying_power,
                cash: buying_power,
                positions: Vec::new(),
                orders: Vec::new(),
                reject_orders: false,
                fail_account: false,
                fail_positions: false,
            }),
        }
    }

    pub fn with_position(self, position: BrokerPosition) -> Self {
        self.inner.lock().unwrap().positions.push(position);
        self
    }

    pub fn set_reject_orders(&self, reject: bool) {
        self.inner.lock().unwrap().reject_orders = reject;
    }

    pub fn set_fail_account(&self, fail: bool) {
        self.inner.lock().unwrap().fail_account = fail;
    }

    pub fn set_fail_positions(&self, fail: bool) {
        self.inner.lock().unwrap().fail_positions = fail;
    }

    pub fn set_buying_power(&self, buying_power: f64) {
        self.inner.lock().unwrap().buying_power = buying_power;
    }

    pub fn set_cash(&self, cash: f64) {
        self.inner.lock().unwrap().cash = cash;
    }

    pub fn orders(&self) -> Vec<Order> {
        self.inner.lock().unwrap().orders.clone()
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn submit_market_order(
        &self,
        symbol: &str,
        qty: f64,
        side: OrderSide,
    ) -> Result<Order, BrokerError> {
        let mut state = self.inner.lock().unwrap();
        if state.reject_orders {
            return Err(BrokerError::Rejected {
                reason: "rejected by test".to_string(),
            });
        }

        let order = Order {
            id: format!("paper-{}", state.orders.len() + 1),
            client_order_id: Uuid::new_v4(),
            symbol: symbol.replace('/', ""),
            qty,
            side,
            submitted_at: Utc::now(),
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn get_account(&self) -> Result<Account, BrokerError> {
        let state = self.inner.lock().unwrap();
        if state.fail_account {
            return Err(BrokerError::Malformed("account unavailable".to_string()));
        }
        Ok(Account {
            buying_power: state.buying_power,
            cash: state.cash,
        })
    }

    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let state = self.inner.lock().unwrap();
        if state.fail_positions {
            return Err(BrokerError::Malformed("positions unavailable".to_string()));
        }
        Ok(state.positions.clone())
    }
}
