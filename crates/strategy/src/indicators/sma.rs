use std::collections::VecDeque;

/// Bounded buffer of the most recent `capacity` observations with simple
/// moving averages over all or the newest part of it.
///
/// Means are recomputed from the stored values on every call, so a window of
/// equal values averages to exactly that value.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be >= 1");
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append `value`, evicting and returning the oldest one once full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// Mean of every stored value. `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        self.mean_last(self.values.len())
    }

    /// Mean of the newest `n` values.
    /// Returns `None` if `n` is zero or more than are stored.
    pub fn mean_last(&self, n: usize) -> Option<f64> {
        if n == 0 || n > self.values.len() {
            return None;
        }
        let sum: f64 = self.values.iter().rev().take(n).sum();
        Some(sum / n as f64)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}
