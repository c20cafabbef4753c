pub mod dca;
pub mod indicators;
pub mod moving_average;
pub mod params;
pub mod registry;
pub mod runner;

pub use dca::DollarCostAverage;
pub use moving_average::{MovingAverageCrossover, PriceField};
pub use registry::StrategyRegistry;
pub use runner::StrategyRunner;

use async_trait::async_trait;
use common::{Result, Tick, TransactionSink};

/// All strategy implementations must satisfy this trait.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Registry name of this strategy.
    fn name(&self) -> &str;

    /// Parse the comma-separated positional parameter string.
    ///
    /// Must run exactly once before the first tick. Wrong arity or a
    /// malformed value fails with `InvalidParameters`. Parsing the same string
    /// twice yields the same settings.
    fn configure(&mut self, params: &str) -> Result<()>;

    /// Update internal state from one tick and optionally queue transactions
    /// through `sink`. Ticks arrive oldest first, one at a time.
    async fn process_tick(&mut self, tick: &Tick, sink: &TransactionSink) -> Result<()>;
}
