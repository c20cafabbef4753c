use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::types::epoch_to_datetime;
use crate::{Error, Result, Tick};

/// A finite, time-ordered sequence of ticks.
///
/// Implementations load their whole data set up front, so a constructed
/// source can no longer fail. The sequence is consumed once; restarting means
/// building a new source.
pub trait TickSource: Send {
    /// Short identifier used in logs, e.g. `binance_csv:data/btc.csv`.
    fn name(&self) -> &str;

    /// Whether another tick is available.
    fn has_next(&self) -> bool;

    /// Return the tick under the cursor and advance. `None` once exhausted.
    fn next_tick(&mut self) -> Option<Tick>;

    /// Ticks not yet handed out.
    fn remaining(&self) -> usize;
}

/// In-memory tick table shared by the file and API sources.
///
/// Rows are normalized once at construction: descending data is reversed and
/// open times (first column) must then be strictly increasing.
#[derive(Debug, Clone)]
pub struct TickTable {
    name: String,
    columns: Arc<[String]>,
    rows: Vec<Arc<[f64]>>,
    reversed: bool,
    cursor: usize,
}

impl TickTable {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        mut rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let name = name.into();
        if columns.is_empty() {
            return Err(Error::data_unavailable(&name, "no numeric columns"));
        }
        let ragged = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len());
        if let Some((idx, row)) = ragged {
            return Err(Error::data_unavailable(
                &name,
                format!(
                    "row {} has {} fields, header has {}",
                    idx + 1,
                    row.len(),
                    columns.len()
                ),
            ));
        }

        let reversed = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => first[0] > last[0],
            _ => false,
        };
        if reversed {
            rows.reverse();
        }

        let out_of_order = rows
            .windows(2)
            .position(|w| w[0][0].partial_cmp(&w[1][0]) != Some(Ordering::Less));
        if let Some(idx) = out_of_order {
            return Err(Error::data_unavailable(
                &name,
                format!(
                    "rows are not in strictly increasing '{}' order (row {} -> {})",
                    columns[0],
                    idx + 1,
                    idx + 2
                ),
            ));
        }

        let table = Self {
            name,
            columns: columns.into(),
            rows: rows.into_iter().map(Arc::from).collect(),
            reversed,
            cursor: 0,
        };

        info!(
            source = %table.name,
            rows = table.rows.len(),
            columns = ?table.columns,
            reversed,
            from = ?table.first_open_time(),
            to = ?table.last_open_time(),
            "Loaded tick data"
        );
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the stored order was descending and got flipped at load.
    pub fn was_reversed(&self) -> bool {
        self.reversed
    }

    pub fn first_open_time(&self) -> Option<DateTime<Utc>> {
        self.rows.first().and_then(|r| epoch_to_datetime(r[0]))
    }

    pub fn last_open_time(&self) -> Option<DateTime<Utc>> {
        self.rows.last().and_then(|r| epoch_to_datetime(r[0]))
    }
}

impl TickSource for TickTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_next(&self) -> bool {
        self.cursor < self.rows.len()
    }

    fn next_tick(&mut self) -> Option<Tick> {
        let row = self.rows.get(self.cursor)?;
        let tick = Tick::new(self.columns.clone(), row.clone());
        self.cursor += 1;
        Some(tick)
    }

    fn remaining(&self) -> usize {
        self.rows.len() - self.cursor
    }
}
