// The position lifecycle engine: decision controller, balance refresher,
// and the operator-facing handle
pub mod balance;
pub mod controller;
pub mod order_log;

pub use balance::BalanceRefresher;
pub use controller::PositionController;
pub use order_log::OrderLog;

use crate::broker::BrokerGateway;
use crate::feed::{FeedSupervisor, QuoteFeed};
use crate::models::BotSnapshot;
use crate::state::{CommandChannel, ConfigError, ConfigStore, SharedState, Shutdown};
use std::path::PathBuf;
use std::sync::Arc;

/// Operating parameters fixed at engine construction
///
/// Only the entry threshold is mutable afterwards, through the handle.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub symbol: String,
    pub entry_threshold: f64,
    pub profit_target_pct: f64,
    pub stop_loss_pct: f64,
    /// Order quantity is (buying_power / sizing_divisor) / price
    pub sizing_divisor: f64,
    pub feed_poll_secs: u64,
    pub order_summary_path: PathBuf,
    pub redis_url: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            symbol: "BTC/USD".to_string(),
            entry_threshold: 60000.0,
            profit_target_pct: 5.0,
            stop_loss_pct: -2.0,
            sizing_divisor: 3.0,
            feed_poll_secs: 2,
            order_summary_path: PathBuf::from("order_summary.txt"),
            redis_url: None,
        }
    }
}

impl EngineSettings {
    /// Read settings from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        Self {
            symbol: std::env::var("SYMBOL").unwrap_or(defaults.symbol),
            entry_threshold: parse_var("ENTRY_THRESHOLD", defaults.entry_threshold),
            profit_target_pct: parse_var("PROFIT_TARGET_PCT", defaults.profit_target_pct),
            stop_loss_pct: parse_var("STOP_LOSS_PCT", defaults.stop_loss_pct),
            sizing_divisor: parse_var("SIZING_DIVISOR", defaults.sizing_divisor),
            feed_poll_secs: parse_var("FEED_POLL_SECS", defaults.feed_poll_secs),
            order_summary_path: std::env::var("ORDER_SUMMARY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.order_summary_path),
            redis_url: std::env::var("REDIS_URL").ok(),
        }
    }
}

/// Operator contract: snapshot reads, threshold writes, manual trade
/// trigger, stop trigger
///
/// Cheap to clone; every clone talks to the same engine.
#[derive(Clone)]
pub struct EngineHandle {
    state: Arc<SharedState>,
    config: Arc<ConfigStore>,
    commands: Arc<CommandChannel>,
    shutdown: Arc<Shutdown>,
}

impl EngineHandle {
    pub fn snapshot(&self) -> BotSnapshot {
        self.state.snapshot()
    }

    pub fn entry_threshold(&self) -> f64 {
        self.config.entry_threshold()
    }

    /// Takes effect on the next quote evaluation
    pub fn set_entry_threshold(&self, value: f64) -> Result<(), ConfigError> {
        self.config.set_entry_threshold(value)?;
        tracing::info!("Entry threshold updated to ${:.2}", value);
        Ok(())
    }

    /// Request an immediate entry attempt; returns `false` if a request was
    /// already pending
    pub fn request_execute_trade(&self) -> bool {
        let registered = self.commands.request_execute();
        if registered {
            self.state.set_execute_requested(true);
            tracing::info!("Manual trade execution requested");
        }
        registered
    }

    /// Cooperative stop; in-flight broker calls complete first
    pub fn stop(&self) {
        tracing::info!("Stop requested");
        self.shutdown.trigger();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_stopped()
    }

    /// Resolve once the engine has begun shutting down
    pub async fn stopped(&self) {
        self.shutdown.wait().await;
    }
}

/// One tradeable instrument's engine instance
///
/// Owns all mutable state; nothing lives in module-level globals, so several
/// engines can coexist in one process and tests can run them in isolation.
pub struct Engine<B, F> {
    settings: EngineSettings,
    broker: Arc<B>,
    feed: F,
    state: Arc<SharedState>,
    config: Arc<ConfigStore>,
    commands: Arc<CommandChannel>,
    shutdown: Arc<Shutdown>,
}

impl<B, F> Engine<B, F>
where
    B: BrokerGateway + 'static,
    F: QuoteFeed + 'static,
{
    pub fn new(settings: EngineSettings, broker: B, feed: F) -> Self {
        let config = Arc::new(ConfigStore::new(settings.entry_threshold));
        Self {
            settings,
            broker: Arc::new(broker),
            feed,
            state: Arc::new(SharedState::new()),
            config,
            commands: Arc::new(CommandChannel::new()),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            state: self.state.clone(),
            config: self.config.clone(),
            commands: self.commands.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Reconcile against the brokerage, then stream quotes until stopped
    ///
    /// Returns an error only for fatal startup failures; a stop during
    /// normal operation resolves to `Ok`.
    pub async fn run(self) -> crate::Result<()> {
        let symbol = self.settings.symbol.clone();
        tracing::info!("🚀 Position engine starting for {}", symbol);

        let mut controller = PositionController::new(
            self.broker.clone(),
            self.settings.clone(),
            self.state.clone(),
            self.config.clone(),
            self.commands.clone(),
            self.shutdown.clone(),
        );

        // A live position may already be open at the brokerage from a
        // previous run; failing to find out is fatal
        if let Err(e) = controller.reconcile().await {
            self.state.mark_stopped();
            self.shutdown.trigger();
            return Err(format!("startup reconciliation failed: {}", e).into());
        }

        let balance_task = {
            let refresher = BalanceRefresher::new(
                self.broker.clone(),
                self.state.clone(),
                self.shutdown.clone(),
            );
            tokio::spawn(refresher.run())
        };

        let supervisor = FeedSupervisor::new(
            self.feed,
            controller,
            self.state.clone(),
            self.shutdown.clone(),
        );
        supervisor.run(&symbol).await;

        // Supervisor exits on operator stop or retry exhaustion; either way
        // the engine is done
        self.state.mark_stopped();
        self.shutdown.trigger();
        if let Err(e) = balance_task.await {
            tracing::warn!("Balance refresher task failed: {}", e);
        }

        tracing::info!("👋 Position engine for {} stopped", symbol);
        Ok(())
    }
}
