use crate::broker::alpaca::trading_symbol;
use crate::broker::BrokerGateway;
use crate::engine::{EngineSettings, OrderLog};
use crate::models::{OrderSide, Position, Quote};
use crate::state::{CommandChannel, ConfigStore, SharedState, Shutdown};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Decides, for every incoming quote, whether to open, hold, or close the
/// position, and executes the resulting market order
///
/// Exactly one decision cycle runs at a time: the feed supervisor awaits
/// `on_quote` before pulling the next quote, so entry and exit evaluation
/// never race for the same symbol. The position itself is owned here;
/// observers only ever see the read-only mirror in `SharedState`.
pub struct PositionController<B> {
    broker: B,
    settings: EngineSettings,
    state: Arc<SharedState>,
    config: Arc<ConfigStore>,
    commands: Arc<CommandChannel>,
    shutdown: Arc<Shutdown>,
    position: Option<Position>,
    order_log: OrderLog,
}

impl<B: BrokerGateway> PositionController<B> {
    pub fn new(
        broker: B,
        settings: EngineSettings,
        state: Arc<SharedState>,
        config: Arc<ConfigStore>,
        commands: Arc<CommandChannel>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        let order_log = OrderLog::new(settings.order_summary_path.clone());
        Self {
            broker,
            settings,
            state,
            config,
            commands,
            shutdown,
            position: None,
            order_log,
        }
    }

    /// Adopt a position already open at the brokerage, if any
    ///
    /// Runs once before the feed starts so a process restart with a live
    /// position picks up where the previous run left off.
    pub async fn reconcile(&mut self) -> anyhow::Result<()> {
        let positions = self
            .broker
            .get_open_positions()
            .await
            .context("querying open positions")?;

        let symbol = trading_symbol(&self.settings.symbol);
        if let Some(existing) = positions.iter().find(|p| p.symbol == symbol) {
            let position = Position {
                entry_price: existing.avg_entry_price,
                quantity: existing.qty,
                entry_time: Utc::now(),
            };
            tracing::info!(
                "Existing position detected: {:.6} {} at ${:.2}",
                position.quantity,
                self.settings.symbol,
                position.entry_price
            );
            self.position = Some(position.clone());
            self.state.enter_position(position);
        } else {
            self.state.mark_waiting();
        }
        Ok(())
    }

    /// One decision cycle for one quote
    pub async fn on_quote(&mut self, quote: Quote) {
        if self.shutdown.is_stopped() {
            tracing::debug!("Engine is stopped, ignoring quote");
            return;
        }

        let price = quote.bid_price;
        tracing::debug!("Received price update: {} at ${:.2}", quote.symbol, price);

        // Consume a pending manual request exactly once per cycle, whether
        // or not it can be honored
        let manual_entry = self.commands.take_execute();
        if manual_entry {
            self.state.set_execute_requested(false);
        }

        match self.position.clone() {
            None => {
                self.state.record_quote(price);
                let entry_threshold = self.config.entry_threshold();

                if manual_entry {
                    tracing::info!("Manual trade requested. Attempting entry at ${:.2}", price);
                    self.try_enter(price).await;
                } else if price <= entry_threshold {
                    tracing::info!(
                        "Price ${:.2} <= entry threshold ${:.2}. Evaluating buy opportunity.",
                        price,
                        entry_threshold
                    );
                    self.try_enter(price).await;
                }
            }
            Some(position) => {
                if manual_entry {
                    tracing::warn!("Manual trade request ignored: already in a position");
                }

                let profit_pct = (price - position.entry_price) / position.entry_price * 100.0;
                let pnl = (price - position.entry_price) * position.quantity;
                self.state
                    .record_quote_in_position(price, pnl, quote.timestamp);
                tracing::debug!("Current profit: {:.2}%", profit_pct);

                if profit_pct >= self.settings.profit_target_pct {
                    tracing::info!(
                        "Profit target reached ({:.2}%). Placing sell order.",
                        profit_pct
                    );
                    self.try_exit(price, position.quantity).await;
                } else if profit_pct <= self.settings.stop_loss_pct {
                    tracing::info!(
                        "Stop-loss triggered ({:.2}%). Placing sell order.",
                        profit_pct
                    );
                    self.try_exit(price, position.quantity).await;
                }
            }
        }
    }

    /// Attempt a BUY at the quoted price; sizing always uses fresh buying
    /// power, never a cached value
    async fn try_enter(&mut self, price: f64) {
        let account = match self.broker.get_account().await {
            Ok(account) => account,
            Err(e) => {
                tracing::error!("Failed to fetch account before entry: {}", e);
                return;
            }
        };

        let qty = (account.buying_power / self.settings.sizing_divisor) / price;
        if qty <= 0.0 {
            tracing::warn!(
                "No buying power available (${:.2}), skipping entry",
                account.buying_power
            );
            return;
        }
        tracing::info!("Calculated order quantity: {:.6}", qty);

        match self
            .broker
            .submit_market_order(&self.settings.symbol, qty, OrderSide::Buy)
            .await
        {
            Ok(order) => {
                let position = Position {
                    entry_price: price,
                    quantity: qty,
                    entry_time: Utc::now(),
                };
                self.position = Some(position.clone());
                self.state.enter_position(position);
                self.order_log.record(&order, price);
                tracing::info!(
                    "Entered position: bought {:.6} {} at ${:.2}",
                    qty,
                    self.settings.symbol,
                    price
                );
            }
            Err(e) => {
                // Stay flat; the next quote re-evaluates from scratch
                tracing::error!("Buy order failed: {}", e);
            }
        }
    }

    /// Attempt to SELL the full held quantity
    async fn try_exit(&mut self, price: f64, qty: f64) {
        match self
            .broker
            .submit_market_order(&self.settings.symbol, qty, OrderSide::Sell)
            .await
        {
            Ok(order) => {
                self.position = None;
                self.state.exit_position();
                self.order_log.record(&order, price);
                tracing::info!(
                    "Exited position: sold {:.6} {} at ${:.2}",
                    qty,
                    self.settings.symbol,
                    price
                );
            }
            Err(e) => {
                // Keep holding; the next quote retries the exit check
                tracing::error!("Sell order failed: {}", e);
            }
        }
    }

    #[cfg(test)]
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }
}
