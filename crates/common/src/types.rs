use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// An intent to buy or sell `amount` units at `desired_value` per unit,
/// queued from a strategy to an exchange and consumed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transaction {
    side: Side,
    amount: f64,
    desired_value: f64,
}

impl Transaction {
    pub fn buy(amount: f64, price: f64) -> Result<Self> {
        Self::new(Side::Buy, amount, price)
    }

    pub fn sell(amount: f64, price: f64) -> Result<Self> {
        Self::new(Side::Sell, amount, price)
    }

    fn new(side: Side, amount: f64, price: f64) -> Result<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(amount) || !valid(price) {
            return Err(Error::InvalidTransaction { amount, price });
        }
        Ok(Self {
            side,
            amount,
            desired_value: price,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn desired_value(&self) -> f64 {
        self.desired_value
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        write!(
            f,
            "Request to {verb} {} security at {}",
            self.amount, self.desired_value
        )
    }
}

/// One row of market data: named numeric fields in source column order.
///
/// The column header is shared by every tick of a data set; the values are an
/// immutable snapshot, so a consumer cannot alter what the source holds.
/// By convention the first column is the open time.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    columns: Arc<[String]>,
    values: Arc<[f64]>,
}

impl Tick {
    /// Build a tick from a header and a row of the same width.
    pub fn new(columns: Arc<[String]>, values: Arc<[f64]>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Field lookup: exact column name first, then ASCII case-insensitive.
    pub fn get(&self, field: &str) -> Option<f64> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == field)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(field)))?;
        self.values.get(idx).copied()
    }

    /// Like [`Tick::get`] but a missing field is an error.
    pub fn require(&self, field: &str) -> Result<f64> {
        self.get(field)
            .ok_or_else(|| Error::MissingField(field.to_string()))
    }

    pub fn open_time(&self) -> f64 {
        self.values.first().copied().unwrap_or(f64::NAN)
    }

    /// Open time as a UTC timestamp. Values above 1e11 are read as epoch
    /// milliseconds, smaller ones as epoch seconds.
    pub fn open_datetime(&self) -> Option<DateTime<Utc>> {
        epoch_to_datetime(self.open_time())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn epoch_to_datetime(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() > 1e11 { value } else { value * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Snapshot of a simulated account, published after every fill.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExchangeSummary {
    /// Units of the traded security held. Positive = long.
    pub current_balance: f64,
    /// Cumulative cash delta since the account was opened.
    pub currency_held: f64,
    pub num_purchases: u64,
    pub num_sales: u64,
    /// Price of the most recent fill.
    pub last_price: Option<f64>,
    /// Mark-to-market P/L at `last_price`.
    pub profit_loss: Option<f64>,
}

/// The three long-running pieces of a backtest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    TickSource,
    Strategy,
    Exchange,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Component::TickSource => write!(f, "tick source"),
            Component::Strategy => write!(f, "strategy"),
            Component::Exchange => write!(f, "exchange"),
        }
    }
}

/// Terminal state of one pipeline task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TaskState {
    /// Ran to its end. `processed` counts items published or consumed.
    Completed { processed: u64 },
    /// Stopped by the orchestrator during shutdown.
    Cancelled,
    /// Returned an error or panicked.
    Failed { error: String },
}

impl TaskState {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskState::Failed { .. })
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Completed { processed } => write!(f, "completed ({processed} items)"),
            TaskState::Cancelled => write!(f, "cancelled"),
            TaskState::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub component: Component,
    pub state: TaskState,
}

/// Lifecycle of one backtest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Created,
    Wiring,
    Running,
    /// Cancellation or drain has been issued; waiting for tasks to settle.
    Draining,
    Terminated,
}

impl RunState {
    /// Whether `next` is a legal successor. The only shortcut is a setup
    /// failure going straight from `Wiring` to `Terminated`.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Created, Wiring)
                | (Wiring, Running)
                | (Wiring, Terminated)
                | (Running, Draining)
                | (Draining, Terminated)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Created => write!(f, "created"),
            RunState::Wiring => write!(f, "wiring"),
            RunState::Running => write!(f, "running"),
            RunState::Draining => write!(f, "draining"),
            RunState::Terminated => write!(f, "terminated"),
        }
    }
}
