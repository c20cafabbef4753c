use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use common::{Result, Tick, TickSource};

/// Publishes every tick of a loaded source, in order, onto the tick channel.
pub struct TickFeed {
    source: Box<dyn TickSource>,
    tick_tx: mpsc::Sender<Tick>,
}

impl TickFeed {
    pub fn new(source: Box<dyn TickSource>, tick_tx: mpsc::Sender<Tick>) -> Self {
        Self { source, tick_tx }
    }

    /// Run the feed. Call from `tokio::spawn`.
    ///
    /// Yields to the scheduler after every push so the strategy and exchange
    /// see ticks as they arrive. Returns the number of ticks published once
    /// the source is exhausted. No end marker is sent; completion of this task
    /// is the signal.
    pub async fn run(mut self) -> Result<u64> {
        info!(
            source = %self.source.name(),
            ticks = self.source.remaining(),
            "Tick feed running"
        );

        let mut published = 0u64;
        while self.source.has_next() {
            let Some(tick) = self.source.next_tick() else {
                break;
            };
            if self.tick_tx.send(tick).await.is_err() {
                warn!(published, "Tick channel closed, strategy is gone");
                break;
            }
            published += 1;
            debug!(published, "Tick published");
            tokio::task::yield_now().await;
        }

        info!(published, "Tick feed exhausted");
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TickTable;

    fn table(n: usize) -> Box<dyn TickSource> {
        let rows = (0..n).map(|i| vec![i as f64, 1.0]).collect();
        Box::new(TickTable::new("t", vec!["open time".into(), "close".into()], rows).unwrap())
    }

    #[tokio::test]
    async fn publishes_every_tick_in_order() {
        let (tx, mut rx) = mpsc::channel(100);
        let published = TickFeed::new(table(5), tx).run().await.unwrap();
        assert_eq!(published, 5);

        let mut times = Vec::new();
        while let Some(tick) = rx.recv().await {
            times.push(tick.open_time());
        }
        assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn empty_source_publishes_nothing() {
        let (tx, mut rx) = mpsc::channel(1);
        assert_eq!(TickFeed::new(table(0), tx).run().await.unwrap(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert_eq!(TickFeed::new(table(3), tx).run().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn yields_between_pushes() {
        let (tx, mut rx) = mpsc::channel(100);
        let feed = tokio::spawn(TickFeed::new(table(3), tx).run());

        // The first push is visible before the feed finishes.
        let first = rx.recv().await.unwrap();
        assert_eq!(first.open_time(), 0.0);
        assert_eq!(feed.await.unwrap().unwrap(), 3);
    }
}
