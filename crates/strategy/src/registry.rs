use tracing::info;

use common::{Registry, Result};

use crate::{DollarCostAverage, MovingAverageCrossover, Strategy};

pub type StrategyFactory = fn() -> Box<dyn Strategy>;

/// Name → constructor table for every strategy the CLI can select.
pub struct StrategyRegistry {
    inner: Registry<StrategyFactory>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self {
            inner: Registry::<StrategyFactory>::new("strategy")
                .register(MovingAverageCrossover::NAME, moving_average)
                .register(DollarCostAverage::NAME, dca),
        }
    }
}

impl StrategyRegistry {
    /// A fresh, unconfigured instance of the named strategy.
    pub fn create(&self, name: &str) -> Result<Box<dyn Strategy>> {
        let factory = self.inner.resolve(name)?;
        Ok(factory())
    }

    /// Create the named strategy and configure it with `params`.
    pub fn build(&self, name: &str, params: &str) -> Result<Box<dyn Strategy>> {
        let mut strategy = self.create(name)?;
        strategy.configure(params)?;
        info!(strategy = %strategy.name(), params, "Strategy ready");
        Ok(strategy)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inner.names()
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

fn moving_average() -> Box<dyn Strategy> {
    Box::new(MovingAverageCrossover::new())
}

fn dca() -> Box<dyn Strategy> {
    Box::new(DollarCostAverage::new())
}
