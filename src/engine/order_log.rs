use crate::models::{Order, OrderSide};
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;

/// Plain-text summary of every fill, appended to a file the operator can
/// tail. Write failures are logged and never interrupt trading.
pub struct OrderLog {
    path: PathBuf,
}

impl OrderLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn record(&self, order: &Order, price: f64) {
        let side = match order.side {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        };
        let summary = format!(
            "Order Type: Market Order\n\
             Symbol: {}\n\
             Quantity: {:.6}\n\
             Price: {:.2}\n\
             Side: {}\n\
             Time: {}\n\
             -------------------------------\n",
            order.symbol,
            order.qty,
            price,
            side,
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
        );

        if let Err(e) = self.append(&summary) {
            tracing::warn!("Failed to write order summary to {:?}: {}", self.path, e);
        }
    }

    fn append(&self, summary: &str) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(summary.as_bytes())
    }
}
