use std::ops::RangeInclusive;
use std::str::FromStr;

use common::{Error, Result};

/// Comma-separated positional parameters, e.g. `"10,50,close"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalParams<'a> {
    strategy: &'static str,
    fields: Vec<&'a str>,
}

impl<'a> PositionalParams<'a> {
    /// Split `raw` and check the field count against `arity`.
    pub fn parse(
        strategy: &'static str,
        raw: &'a str,
        arity: RangeInclusive<usize>,
    ) -> Result<Self> {
        let fields: Vec<&str> = if raw.trim().is_empty() {
            Vec::new()
        } else {
            raw.split(',').map(str::trim).collect()
        };

        if !arity.contains(&fields.len()) {
            let expected = if arity.start() == arity.end() {
                arity.start().to_string()
            } else {
                format!("{} to {}", arity.start(), arity.end())
            };
            return Err(Error::invalid_parameters(
                strategy,
                format!("expected {expected} values, got {} in '{raw}'", fields.len()),
            ));
        }

        Ok(Self { strategy, fields })
    }

    /// Parse the field at `idx` as `T`.
    pub fn required<T>(&self, idx: usize, label: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.fields.get(idx).ok_or_else(|| {
            Error::invalid_parameters(self.strategy, format!("missing {label}"))
        })?;
        raw.parse().map_err(|e| {
            Error::invalid_parameters(self.strategy, format!("{label} '{raw}': {e}"))
        })
    }

    pub fn optional(&self, idx: usize) -> Option<&'a str> {
        self.fields.get(idx).copied()
    }

    pub fn invalid(&self, reason: impl ToString) -> Error {
        Error::invalid_parameters(self.strategy, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_trims() {
        let p = PositionalParams::parse("s", " 10, 50 ,close", 2..=3).unwrap();
        assert_eq!(p.required::<usize>(0, "fast").unwrap(), 10);
        assert_eq!(p.required::<usize>(1, "slow").unwrap(), 50);
        assert_eq!(p.optional(2), Some("close"));
        assert_eq!(p.optional(3), None);
    }

    #[test]
    fn wrong_arity_rejected() {
        let err = PositionalParams::parse("s", "1,2,3,4", 2..=3).unwrap_err();
        assert!(err.to_string().contains("expected 2 to 3 values, got 4"), "{err}");

        let err = PositionalParams::parse("s", "", 2..=2).unwrap_err();
        assert!(err.to_string().contains("expected 2 values, got 0"), "{err}");
    }

    #[test]
    fn malformed_number_rejected() {
        let p = PositionalParams::parse("s", "ten", 1..=1).unwrap();
        let err = p.required::<usize>(0, "fast window").unwrap_err();
        assert!(matches!(err, Error::InvalidParameters { .. }));
        assert!(err.to_string().contains("fast window 'ten'"), "{err}");
    }
}
