use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use common::{consume, Handler, Result, Tick, TransactionSink};

use crate::Strategy;

/// Drives one configured strategy: pulls ticks from the tick channel in order
/// and lets the strategy queue transactions on the sink.
pub struct StrategyRunner {
    strategy: Box<dyn Strategy>,
    sink: TransactionSink,
}

impl StrategyRunner {
    pub fn new(strategy: Box<dyn Strategy>, sink: TransactionSink) -> Self {
        Self { strategy, sink }
    }

    /// Run the tick loop. Call from `tokio::spawn`.
    ///
    /// Runs until cancelled. If every tick sender is dropped the queued ticks
    /// are still processed, then the number of ticks handled is returned.
    pub async fn run(mut self, tick_rx: mpsc::Receiver<Tick>) -> Result<u64> {
        info!(strategy = %self.strategy.name(), "Strategy running");
        consume("tick", tick_rx, &mut self).await
    }
}

#[async_trait]
impl Handler<Tick> for StrategyRunner {
    async fn handle(&mut self, tick: Tick) -> Result<()> {
        self.strategy.process_tick(&tick, &self.sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StrategyRegistry;
    use common::Side;
    use std::sync::Arc;

    #[tokio::test]
    async fn runner_feeds_ticks_and_forwards_transactions() {
        let strategy = StrategyRegistry::default().build("dca", "2,10").unwrap();
        let (tick_tx, tick_rx) = mpsc::channel(8);
        let (tx_tx, mut tx_rx) = mpsc::channel(8);
        let runner = StrategyRunner::new(strategy, TransactionSink::new(tx_tx));

        let columns: Arc<[String]> = vec!["open time".to_string(), "close".into()].into();
        for i in 0..4 {
            tick_tx
                .send(Tick::new(columns.clone(), vec![i as f64, 5.0].into()))
                .await
                .unwrap();
        }
        drop(tick_tx);

        let processed = runner.run(tick_rx).await.unwrap();
        assert_eq!(processed, 4);

        let mut buys = 0;
        while let Ok(t) = tx_rx.try_recv() {
            assert_eq!(t.side(), Side::Buy);
            assert_eq!(t.amount(), 2.0);
            buys += 1;
        }
        assert_eq!(buys, 2);
    }

    #[tokio::test]
    async fn strategy_error_ends_the_loop() {
        let strategy = StrategyRegistry::default().build("dca", "1,10").unwrap();
        let (tick_tx, tick_rx) = mpsc::channel(8);
        let (tx_tx, _tx_rx) = mpsc::channel(8);
        let runner = StrategyRunner::new(strategy, TransactionSink::new(tx_tx));

        // no close column
        let columns: Arc<[String]> = vec!["open time".to_string()].into();
        tick_tx
            .send(Tick::new(columns, vec![0.0].into()))
            .await
            .unwrap();

        let err = runner.run(tick_rx).await.unwrap_err();
        assert!(matches!(err, common::Error::MissingField(_)));
    }
}
