use async_trait::async_trait;

use crate::{ExchangeSummary, Result};

/// Abstraction over the venue that fills transactions.
///
/// `FakeExchange` implements this for backtests. A live adapter would replace
/// only the fill logic and keep the same contract.
///
/// Only the exchange consume loop in `crates/engine` drives an exchange; fills
/// are applied strictly one at a time, in the order transactions were queued.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Registry name of this venue.
    fn name(&self) -> &str;

    /// Fill a purchase of `qty` units at `price`.
    async fn buy(&mut self, qty: f64, price: f64) -> Result<()>;

    /// Fill a sale of `qty` units at `price`.
    async fn sell(&mut self, qty: f64, price: f64) -> Result<()>;

    /// Units of the security currently held. Pure read.
    fn current_balance(&self) -> f64;

    /// Snapshot of the account for reporting.
    fn summary(&self) -> ExchangeSummary;
}
