use crate::models::{BotSnapshot, BotStatus, PnlPoint, Position};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::Notify;

/// Maximum number of PnL points kept for observers; oldest evicted first
const PNL_HISTORY_CAP: usize = 1000;

struct BotState {
    status: BotStatus,
    latest_price: Option<f64>,
    account_balance: Option<f64>,
    position: Option<Position>,
    pnl: f64,
    pnl_history: VecDeque<PnlPoint>,
    execute_trade_requested: bool,
}

/// Thread-safe engine state shared with the operator interface
///
/// All mutations go through accessor methods that hold the write lock for the
/// duration of one logical update, so observers never see a quote cycle
/// half-applied. Invariant: `position` is present iff `status == InPosition`.
pub struct SharedState {
    inner: RwLock<BotState>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BotState {
                status: BotStatus::Initializing,
                latest_price: None,
                account_balance: None,
                position: None,
                pnl: 0.0,
                pnl_history: VecDeque::new(),
                execute_trade_requested: false,
            }),
        }
    }

    /// Read-only copy for observers
    pub fn snapshot(&self) -> BotSnapshot {
        let state = self.inner.read().unwrap();
        BotSnapshot {
            status: state.status,
            latest_price: state.latest_price,
            account_balance: state.account_balance,
            position: state.position.clone(),
            pnl: state.pnl,
            pnl_history: state.pnl_history.iter().cloned().collect(),
            execute_trade_requested: state.execute_trade_requested,
        }
    }

    pub fn status(&self) -> BotStatus {
        self.inner.read().unwrap().status
    }

    /// Mark the engine ready to trade with no open position
    pub fn mark_waiting(&self) {
        let mut state = self.inner.write().unwrap();
        state.position = None;
        state.status = BotStatus::WaitingToEnter;
    }

    /// Terminal state; the mirrored position is dropped because the engine no
    /// longer tracks it (restart reconciliation recovers it from the broker)
    pub fn mark_stopped(&self) {
        let mut state = self.inner.write().unwrap();
        state.position = None;
        state.status = BotStatus::Stopped;
    }

    /// Record a quote observed while flat
    pub fn record_quote(&self, price: f64) {
        let mut state = self.inner.write().unwrap();
        state.latest_price = Some(price);
    }

    /// Record a quote observed while holding, with the recomputed PnL
    pub fn record_quote_in_position(&self, price: f64, pnl: f64, timestamp: DateTime<Utc>) {
        let mut state = self.inner.write().unwrap();
        state.latest_price = Some(price);
        state.pnl = pnl;
        state.pnl_history.push_back(PnlPoint { timestamp, pnl });
        while state.pnl_history.len() > PNL_HISTORY_CAP {
            state.pnl_history.pop_front();
        }
    }

    /// Mirror a freshly opened position
    pub fn enter_position(&self, position: Position) {
        let mut state = self.inner.write().unwrap();
        state.position = Some(position);
        state.status = BotStatus::InPosition;
    }

    /// Clear the mirrored position after a successful exit
    pub fn exit_position(&self) {
        let mut state = self.inner.write().unwrap();
        state.position = None;
        state.pnl = 0.0;
        state.status = BotStatus::WaitingToEnter;
    }

    pub fn set_balance(&self, balance: f64) {
        self.inner.write().unwrap().account_balance = Some(balance);
    }

    /// Mirror of the command flag, for observers only
    pub fn set_execute_requested(&self, requested: bool) {
        self.inner.write().unwrap().execute_trade_requested = requested;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Invalid operator input, rejected at the boundary
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("entry threshold must be a non-negative finite number, got {0}")]
    InvalidThreshold(f64),
}

/// Mutable operating parameters, written by the operator and read by the
/// engine once per quote evaluation
pub struct ConfigStore {
    entry_threshold: RwLock<f64>,
}

impl ConfigStore {
    pub fn new(entry_threshold: f64) -> Self {
        Self {
            entry_threshold: RwLock::new(entry_threshold),
        }
    }

    pub fn entry_threshold(&self) -> f64 {
        *self.entry_threshold.read().unwrap()
    }

    /// Takes effect on the next quote evaluation
    pub fn set_entry_threshold(&self, value: f64) -> Result<(), ConfigError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::InvalidThreshold(value));
        }
        *self.entry_threshold.write().unwrap() = value;
        Ok(())
    }
}

/// Single-slot manual trade request
///
/// Set by the operator, consumed by the controller at the top of a quote
/// cycle. A second request while one is pending is a no-op, so delivery is
/// at-most-once per set.
pub struct CommandChannel {
    execute_trade: AtomicBool,
}

impl CommandChannel {
    pub fn new() -> Self {
        Self {
            execute_trade: AtomicBool::new(false),
        }
    }

    /// Returns `true` if the request was newly registered, `false` if one was
    /// already pending
    pub fn request_execute(&self) -> bool {
        !self.execute_trade.swap(true, Ordering::SeqCst)
    }

    /// Consume a pending request, if any
    pub fn take_execute(&self) -> bool {
        self.execute_trade.swap(false, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.execute_trade.load(Ordering::SeqCst)
    }
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative stop signal observed by every engine task
///
/// Tasks poll `is_stopped` at loop boundaries and may `wait` on it inside a
/// `select!`. There is no forced preemption; in-flight broker calls complete.
pub struct Shutdown {
    stopped: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once `trigger` has been called
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let state = SharedState::new();
        let snapshot = state.snapshot();

        assert_eq!(snapshot.status, BotStatus::Initializing);
        assert!(snapshot.latest_price.is_none());
        assert!(snapshot.position.is_none());
        assert!(snapshot.pnl_history.is_empty());
    }

    #[test]
    fn test_position_present_iff_in_position() {
        let state = SharedState::new();
        state.mark_waiting();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, BotStatus::WaitingToEnter);
        assert!(snapshot.position.is_none());

        state.enter_position(Position {
            entry_price: 59000.0,
            quantity: 0.017,
            entry_time: Utc::now(),
        });
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, BotStatus::InPosition);
        assert!(snapshot.position.is_some());

        state.exit_position();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, BotStatus::WaitingToEnter);
        assert!(snapshot.position.is_none());
    }

    #[test]
    fn test_stop_clears_mirrored_position() {
        let state = SharedState::new();
        state.enter_position(Position {
            entry_price: 59000.0,
            quantity: 0.017,
            entry_time: Utc::now(),
        });

        state.mark_stopped();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, BotStatus::Stopped);
        assert!(snapshot.position.is_none());
    }

    #[test]
    fn test_pnl_history_capped_fifo() {
        let state = SharedState::new();

        for i in 0..1100 {
            state.record_quote_in_position(59000.0, i as f64, Utc::now());
        }

        let snapshot = state.snapshot();
        assert_eq!(snapshot.pnl_history.len(), 1000);
        // Oldest entries (0..100) were evicted first
        assert_eq!(snapshot.pnl_history[0].pnl, 100.0);
        assert_eq!(snapshot.pnl_history[999].pnl, 1099.0);
    }

    #[test]
    fn test_config_rejects_invalid_threshold() {
        let config = ConfigStore::new(60000.0);

        assert_eq!(
            config.set_entry_threshold(-1.0),
            Err(ConfigError::InvalidThreshold(-1.0))
        );
        assert!(config.set_entry_threshold(f64::NAN).is_err());
        assert!(config.set_entry_threshold(f64::INFINITY).is_err());
        // Stored value untouched by the rejected writes
        assert_eq!(config.entry_threshold(), 60000.0);

        config.set_entry_threshold(58000.0).unwrap();
        assert_eq!(config.entry_threshold(), 58000.0);
    }

    #[test]
    fn test_command_at_most_once() {
        let commands = CommandChannel::new();

        assert!(commands.request_execute());
        // Second request while pending is a no-op
        assert!(!commands.request_execute());

        assert!(commands.take_execute());
        // Consumed; nothing left to take
        assert!(!commands.take_execute());

        // Re-set after consumption works again
        assert!(commands.request_execute());
        assert!(commands.take_execute());
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        use std::sync::Arc;

        let shutdown = Arc::new(Shutdown::new());
        assert!(!shutdown.is_stopped());

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };

        shutdown.trigger();
        waiter.await.unwrap();
        assert!(shutdown.is_stopped());
    }

    #[tokio::test]
    async fn test_shutdown_wait_after_trigger_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.wait().await;
    }
}
