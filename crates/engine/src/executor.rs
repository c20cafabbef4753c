use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::info;

use common::{consume, Exchange, ExchangeSummary, Handler, Result, Transaction};

/// Applies queued transactions to the exchange, one at a time, in order.
///
/// This is the ONLY component that calls `Exchange::buy` / `Exchange::sell`.
/// The account summary is republished after every fill so it survives the
/// task being cancelled.
pub struct ExchangeExecutor {
    exchange: Box<dyn Exchange>,
    summary_tx: watch::Sender<ExchangeSummary>,
}

impl ExchangeExecutor {
    pub fn new(exchange: Box<dyn Exchange>) -> (Self, watch::Receiver<ExchangeSummary>) {
        let (summary_tx, summary_rx) = watch::channel(exchange.summary());
        (
            Self {
                exchange,
                summary_tx,
            },
            summary_rx,
        )
    }

    /// Run the executor loop. Call from `tokio::spawn`.
    pub async fn run(mut self, transaction_rx: mpsc::Receiver<Transaction>) -> Result<u64> {
        info!(exchange = %self.exchange.name(), "Exchange running");
        consume("transaction", transaction_rx, &mut self).await
    }
}

#[async_trait]
impl Handler<Transaction> for ExchangeExecutor {
    async fn handle(&mut self, transaction: Transaction) -> Result<()> {
        info!(%transaction, "Executing transaction");
        let (qty, price) = (transaction.amount(), transaction.desired_value());
        if transaction.is_buy() {
            self.exchange.buy(qty, price).await?;
        } else {
            self.exchange.sell(qty, price).await?;
        }
        self.summary_tx.send_replace(self.exchange.summary());
        Ok(())
    }
}
