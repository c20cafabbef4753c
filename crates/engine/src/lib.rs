pub mod binance;
pub mod executor;
pub mod feed;
pub mod lifecycle;
pub mod registry;

pub use executor::ExchangeExecutor;
pub use feed::TickFeed;
pub use lifecycle::{Backtest, BacktestReport, BacktestRequest, ShutdownPolicy};
pub use registry::{DataSourceKind, DataSourceRegistry, ExchangeRegistry};
