use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{Error, Result, Transaction};

/// Write half of the strategy → exchange queue.
///
/// Every push is a suspension point: a full channel parks the caller until the
/// exchange catches up.
#[derive(Debug, Clone)]
pub struct TransactionSink {
    tx: mpsc::Sender<Transaction>,
}

impl TransactionSink {
    pub fn new(tx: mpsc::Sender<Transaction>) -> Self {
        Self { tx }
    }

    pub async fn buy(&self, amount: f64, price: f64) -> Result<()> {
        self.push(Transaction::buy(amount, price)?).await
    }

    pub async fn sell(&self, amount: f64, price: f64) -> Result<()> {
        self.push(Transaction::sell(amount, price)?).await
    }

    pub async fn push(&self, transaction: Transaction) -> Result<()> {
        debug!(%transaction, "Queueing transaction");
        self.tx
            .send(transaction)
            .await
            .map_err(|_| Error::ChannelClosed("transaction"))
    }
}

/// One step of a consume loop.
#[async_trait]
pub trait Handler<T: Send + 'static>: Send {
    async fn handle(&mut self, item: T) -> Result<()>;
}

/// Shared run loop for pipeline consumers.
///
/// Pulls one item at a time, hands it to `handler`, and counts it as consumed
/// once the handler returns. The loop has no end condition of its own: it
/// stops when the task is cancelled, when the handler fails (the error is
/// returned), or when every sender is gone, in which case the number of
/// consumed items is returned.
pub async fn consume<T, H>(
    stage: &'static str,
    mut rx: mpsc::Receiver<T>,
    handler: &mut H,
) -> Result<u64>
where
    T: Send + 'static,
    H: Handler<T> + ?Sized,
{
    let mut processed = 0u64;
    while let Some(item) = rx.recv().await {
        handler.handle(item).await?;
        processed += 1;
        trace!(stage, processed, "Item consumed");
    }
    debug!(stage, processed, "Input channel closed");
    Ok(processed)
}
