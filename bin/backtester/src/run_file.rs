use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use engine::{BacktestRequest, ShutdownPolicy};

/// A batch of backtests read from TOML:
///
/// ```toml
/// [[backtest]]
/// name = "ma-2-5"
/// strategy = "moving_average"
/// strategy_params = "2,5"
/// exchange = "fake_exchange"
/// datasource = "binance_csv"
/// datasource_path = "data/Binance_BTCUSDT_1h.csv"
/// drain = true
/// ```
#[derive(Debug, Deserialize)]
pub struct RunFile {
    #[serde(default)]
    pub backtest: Vec<RunEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RunEntry {
    pub name: String,
    #[serde(flatten)]
    pub request: BacktestRequest,
    #[serde(default)]
    pub drain: bool,
}

impl RunEntry {
    pub fn shutdown(&self) -> ShutdownPolicy {
        if self.drain {
            ShutdownPolicy::Drain
        } else {
            ShutdownPolicy::Cancel
        }
    }
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Failed to parse run file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: RunFile = toml::from_str(raw)?;
        anyhow::ensure!(!file.backtest.is_empty(), "no [[backtest]] entries");
        Ok(file)
    }
}
