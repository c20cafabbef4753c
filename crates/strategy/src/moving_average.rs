use async_trait::async_trait;
use tracing::info;

use common::{Error, Result, Tick, TransactionSink};

use crate::indicators::RollingWindow;
use crate::params::PositionalParams;
use crate::Strategy;

/// Which tick field feeds the averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceField {
    Open,
    #[default]
    Close,
}

impl PriceField {
    pub fn column(self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::Close => "close",
        }
    }

    /// Accepts the column name, or a boolean "use open" flag.
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "open" | "true" => Some(PriceField::Open),
            "close" | "false" => Some(PriceField::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovingAverageParams {
    pub fast_window: usize,
    pub slow_window: usize,
    pub price_field: PriceField,
}

/// Simple moving average crossover.
///
/// Keeps the last `slow_window` prices. Once the window is full it goes long
/// one unit when the fast mean rises above the slow mean and closes the
/// position when the fast mean is no longer above it. A tie counts as
/// "not above".
#[derive(Debug, Default)]
pub struct MovingAverageCrossover {
    params: Option<MovingAverageParams>,
    window: Option<RollingWindow>,
    currently_holding: bool,
}

impl MovingAverageCrossover {
    pub const NAME: &'static str = "moving_average";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> Option<&MovingAverageParams> {
        self.params.as_ref()
    }

    pub fn window_len(&self) -> usize {
        self.window.as_ref().map_or(0, RollingWindow::len)
    }

    pub fn is_holding(&self) -> bool {
        self.currently_holding
    }

    fn parse_params(raw: &str) -> Result<MovingAverageParams> {
        let p = PositionalParams::parse(Self::NAME, raw, 2..=3)?;
        let fast_window: usize = p.required(0, "fast window")?;
        let slow_window: usize = p.required(1, "slow window")?;
        let price_field = match p.optional(2) {
            None => PriceField::Close,
            Some(raw) => PriceField::parse(raw).ok_or_else(|| {
                p.invalid(format!("price field '{raw}' must be 'open' or 'close'"))
            })?,
        };

        if fast_window == 0 || slow_window == 0 {
            return Err(p.invalid("window sizes must be at least 1"));
        }
        if fast_window > slow_window {
            return Err(p.invalid(format!(
                "fast window ({fast_window}) must not exceed slow window ({slow_window})"
            )));
        }

        Ok(MovingAverageParams {
            fast_window,
            slow_window,
            price_field,
        })
    }
}

#[async_trait]
impl Strategy for MovingAverageCrossover {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configure(&mut self, params: &str) -> Result<()> {
        let parsed = Self::parse_params(params)?;
        info!(
            ma_fast = parsed.fast_window,
            ma_slow = parsed.slow_window,
            field = parsed.price_field.column(),
            "Moving average strategy configured"
        );
        self.window = Some(RollingWindow::new(parsed.slow_window));
        self.params = Some(parsed);
        self.currently_holding = false;
        Ok(())
    }

    async fn process_tick(&mut self, tick: &Tick, sink: &TransactionSink) -> Result<()> {
        let (Some(params), Some(window)) = (self.params, self.window.as_mut()) else {
            return Err(Error::NotConfigured(Self::NAME.to_string()));
        };

        let price = tick.require(params.price_field.column())?;
        window.push(price);
        if !window.is_full() {
            return Ok(());
        }

        let (Some(ma_fast), Some(ma_slow)) = (window.mean_last(params.fast_window), window.mean())
        else {
            return Ok(());
        };

        if ma_fast > ma_slow {
            if !self.currently_holding {
                info!(
                    ma_fast,
                    ma_slow, price, "Buying 1 unit: fast average is above slow average"
                );
                sink.buy(1.0, price).await?;
                self.currently_holding = true;
            }
        } else if self.currently_holding {
            info!(
                ma_fast,
                ma_slow, price, "Selling 1 unit: fast average no longer above slow average"
            );
            sink.sell(1.0, price).await?;
            self.currently_holding = false;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Side, Transaction};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn close_tick(i: usize, close: f64) -> Tick {
        let columns: Arc<[String]> = vec!["open time".to_string(), "open".into(), "close".into()].into();
        Tick::new(columns, vec![i as f64, close - 0.5, close].into())
    }

    async fn feed(strategy: &mut MovingAverageCrossover, closes: &[f64]) -> Vec<(usize, Transaction)> {
        let (tx, mut rx) = mpsc::channel(64);
        let sink = TransactionSink::new(tx);
        let mut fired = Vec::new();
        for (i, &close) in closes.iter().enumerate() {
            strategy.process_tick(&close_tick(i, close), &sink).await.unwrap();
            while let Ok(t) = rx.try_recv() {
                fired.push((i + 1, t));
            }
        }
        fired
    }

    #[tokio::test]
    async fn crossover_buys_once_then_sells_on_tie() {
        let mut s = MovingAverageCrossover::new();
        s.configure("2,5").unwrap();

        let closes = [1.0, 1.0, 1.0, 1.0, 1.0, 10.0, 10.0, 10.0, 10.0, 10.0];
        let fired = feed(&mut s, &closes).await;

        // Tick 6: fast = mean(1, 10) = 5.5 > slow = 2.8. Ticks 7..9 hold.
        // Tick 10: window is all 10s, fast == slow, which closes the position.
        assert_eq!(fired.len(), 2, "{fired:?}");
        assert_eq!(fired[0].0, 6);
        assert_eq!(fired[0].1.side(), Side::Buy);
        assert_eq!(fired[0].1.amount(), 1.0);
        assert_eq!(fired[0].1.desired_value(), 10.0);
        assert_eq!(fired[1].0, 10);
        assert_eq!(fired[1].1.side(), Side::Sell);
        assert!(!s.is_holding());
    }

    #[tokio::test]
    async fn no_trade_until_window_is_full() {
        let mut s = MovingAverageCrossover::new();
        s.configure("1,5").unwrap();
        let fired = feed(&mut s, &[1.0, 2.0, 3.0, 4.0]).await;
        assert!(fired.is_empty());
        assert_eq!(s.window_len(), 4);
    }

    #[tokio::test]
    async fn tie_never_buys() {
        let mut s = MovingAverageCrossover::new();
        s.configure("2,3").unwrap();
        let fired = feed(&mut s, &[5.0; 8]).await;
        assert!(fired.is_empty());
        assert!(!s.is_holding());
    }

    #[tokio::test]
    async fn window_stays_bounded() {
        let mut s = MovingAverageCrossover::new();
        s.configure("2,4").unwrap();
        let closes: Vec<f64> = (1..=20).map(f64::from).collect();
        feed(&mut s, &closes).await;
        assert_eq!(s.window_len(), 4);
    }

    #[tokio::test]
    async fn open_field_selects_open_price() {
        let mut s = MovingAverageCrossover::new();
        s.configure("1,2,open").unwrap();
        let fired = feed(&mut s, &[1.0, 3.0]).await;
        assert_eq!(fired.len(), 1);
        // close_tick sets open = close - 0.5
        assert_eq!(fired[0].1.desired_value(), 2.5);
    }

    #[tokio::test]
    async fn unconfigured_strategy_refuses_ticks() {
        let mut s = MovingAverageCrossover::new();
        let (tx, _rx) = mpsc::channel(1);
        let err = s
            .process_tick(&close_tick(0, 1.0), &TransactionSink::new(tx))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
    }

    #[test]
    fn configure_is_a_pure_parse() {
        let mut s = MovingAverageCrossover::new();
        s.configure("10,50,open").unwrap();
        let first = *s.params().unwrap();
        s.configure("10,50,open").unwrap();
        assert_eq!(first, *s.params().unwrap());
        assert_eq!(
            first,
            MovingAverageParams {
                fast_window: 10,
                slow_window: 50,
                price_field: PriceField::Open,
            }
        );
    }

    #[test]
    fn boolean_flag_selects_field() {
        let mut s = MovingAverageCrossover::new();
        s.configure("1,2,true").unwrap();
        assert_eq!(s.params().unwrap().price_field, PriceField::Open);
        s.configure("1,2,false").unwrap();
        assert_eq!(s.params().unwrap().price_field, PriceField::Close);
    }

    #[test]
    fn invalid_parameters_rejected() {
        for bad in ["", "5", "a,5", "5,b", "1,2,3,4", "0,5", "6,5", "1,2,high"] {
            let mut s = MovingAverageCrossover::new();
            let err = s.configure(bad).unwrap_err();
            assert!(
                matches!(err, Error::InvalidParameters { .. }),
                "'{bad}' gave {err}"
            );
        }
    }
}
