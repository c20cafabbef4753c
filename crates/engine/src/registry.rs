use tracing::info;

use common::{Config, Exchange, Registry, Result, TickSource};
use paper::{ExchangeSettings, FakeExchange};

use crate::binance::{csv_file, klines, KlinesQuery};

/// Tick sources selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    /// Local Binance / CryptoDataDownload history file.
    BinanceCsv,
    /// `/api/v3/klines` download.
    BinanceApi,
}

impl DataSourceKind {
    pub fn name(self) -> &'static str {
        match self {
            DataSourceKind::BinanceCsv => "binance_csv",
            DataSourceKind::BinanceApi => "binance_api",
        }
    }

    /// Load the full data set named by `path`: a file path for `binance_csv`,
    /// a query string for `binance_api`.
    pub async fn load(self, path: &str, config: &Config) -> Result<Box<dyn TickSource>> {
        let source: Box<dyn TickSource> = match self {
            DataSourceKind::BinanceCsv => Box::new(csv_file::load(path)?),
            DataSourceKind::BinanceApi => {
                let query = KlinesQuery::parse(path, config)?;
                Box::new(klines::fetch(&config.binance_api_url, &query).await?)
            }
        };
        info!(source = %source.name(), ticks = source.remaining(), "Tick source ready");
        Ok(source)
    }
}

pub struct DataSourceRegistry {
    inner: Registry<DataSourceKind>,
}

impl Default for DataSourceRegistry {
    fn default() -> Self {
        let inner = [DataSourceKind::BinanceCsv, DataSourceKind::BinanceApi]
            .into_iter()
            .fold(Registry::new("datasource"), |reg, kind| {
                reg.register(kind.name(), kind)
            });
        Self { inner }
    }
}

impl DataSourceRegistry {
    pub fn resolve(&self, name: &str) -> Result<DataSourceKind> {
        self.inner.resolve(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inner.names()
    }
}

pub type ExchangeFactory = fn(ExchangeSettings) -> Box<dyn Exchange>;

pub struct ExchangeRegistry {
    inner: Registry<ExchangeFactory>,
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self {
            inner: Registry::<ExchangeFactory>::new("exchange")
                .register(FakeExchange::NAME, fake_exchange),
        }
    }
}

impl ExchangeRegistry {
    pub fn resolve(&self, name: &str) -> Result<ExchangeFactory> {
        self.inner.resolve(name).copied()
    }

    pub fn create(&self, name: &str, settings: ExchangeSettings) -> Result<Box<dyn Exchange>> {
        let factory = self.resolve(name)?;
        Ok(factory(settings))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inner.names()
    }
}

fn fake_exchange(settings: ExchangeSettings) -> Box<dyn Exchange> {
    Box::new(FakeExchange::new(settings))
}
