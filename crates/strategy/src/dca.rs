use async_trait::async_trait;
use tracing::info;

use common::{Error, Result, Tick, TransactionSink};

use crate::params::PositionalParams;
use crate::Strategy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcaParams {
    /// Buy on every `interval`-th tick, starting with the first.
    pub interval: u64,
    /// Cash spent per purchase.
    pub dollar_amount: f64,
}

/// Dollar-cost averaging: spend a fixed cash amount at the close price every
/// `interval` ticks. Never sells.
#[derive(Debug, Default)]
pub struct DollarCostAverage {
    params: Option<DcaParams>,
    count: u64,
}

impl DollarCostAverage {
    pub const NAME: &'static str = "dca";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> Option<&DcaParams> {
        self.params.as_ref()
    }

    /// Ticks seen so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

#[async_trait]
impl Strategy for DollarCostAverage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configure(&mut self, params: &str) -> Result<()> {
        let p = PositionalParams::parse(Self::NAME, params, 2..=2)?;
        let interval: u64 = p.required(0, "interval")?;
        let dollar_amount: f64 = p.required(1, "dollar amount")?;
        if interval == 0 {
            return Err(p.invalid("interval must be at least 1"));
        }
        if !dollar_amount.is_finite() || dollar_amount <= 0.0 {
            return Err(p.invalid(format!("dollar amount must be positive, got {dollar_amount}")));
        }

        info!(interval, dollar_amount, "DCA strategy configured");
        self.params = Some(DcaParams {
            interval,
            dollar_amount,
        });
        self.count = 0;
        Ok(())
    }

    async fn process_tick(&mut self, tick: &Tick, sink: &TransactionSink) -> Result<()> {
        let params = self
            .params
            .ok_or_else(|| Error::NotConfigured(Self::NAME.to_string()))?;

        if self.count % params.interval == 0 {
            let price = tick.require("close")?;
            let qty = params.dollar_amount / price;
            info!(
                tick = self.count,
                qty,
                price,
                dollar_amount = params.dollar_amount,
                "DCA buy"
            );
            sink.buy(qty, price).await?;
        }
        self.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Side;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn tick(i: usize, close: f64) -> Tick {
        let columns: Arc<[String]> = vec!["open time".to_string(), "close".into()].into();
        Tick::new(columns, vec![i as f64, close].into())
    }

    #[tokio::test]
    async fn buys_every_interval_starting_at_first_tick() {
        let mut s = DollarCostAverage::new();
        s.configure("3,100").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let sink = TransactionSink::new(tx);
        let mut fired = Vec::new();
        for (i, close) in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0].into_iter().enumerate() {
            s.process_tick(&tick(i, close), &sink).await.unwrap();
            while let Ok(t) = rx.try_recv() {
                fired.push((i, t));
            }
        }

        let indices: Vec<usize> = fired.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 3, 6]);
        assert!(fired.iter().all(|(_, t)| t.side() == Side::Buy));
        assert!((fired[0].1.amount() - 10.0).abs() < 1e-12);
        assert!((fired[1].1.amount() - 2.5).abs() < 1e-12);
        assert!((fired[2].1.amount() - 100.0 / 70.0).abs() < 1e-12);
        assert_eq!(fired[2].1.desired_value(), 70.0);
        assert_eq!(s.count(), 7);
    }

    #[tokio::test]
    async fn zero_close_fails_the_tick() {
        let mut s = DollarCostAverage::new();
        s.configure("1,100").unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let err = s
            .process_tick(&tick(0, 0.0), &TransactionSink::new(tx))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction { .. }));
    }

    #[test]
    fn configure_is_a_pure_parse() {
        let mut s = DollarCostAverage::new();
        s.configure("3,100").unwrap();
        let first = *s.params().unwrap();
        s.configure("3,100").unwrap();
        assert_eq!(first, *s.params().unwrap());
        assert_eq!(first.interval, 3);
        assert_eq!(first.dollar_amount, 100.0);
    }

    #[test]
    fn invalid_parameters_rejected() {
        for bad in ["3", "3,100,1", "x,100", "3,y", "0,100", "3,-5", "3,0"] {
            let mut s = DollarCostAverage::new();
            let err = s.configure(bad).unwrap_err();
            assert!(
                matches!(err, Error::InvalidParameters { .. }),
                "'{bad}' gave {err}"
            );
        }
    }
}
