use std::collections::BTreeMap;

use crate::{Error, Result};

/// Name → factory table resolved once at startup.
///
/// Names are matched case-insensitively. An unknown name is an
/// `InvalidConfiguration` listing the valid choices.
pub struct Registry<F> {
    kind: &'static str,
    entries: BTreeMap<&'static str, F>,
}

impl<F> Registry<F> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn register(mut self, name: &'static str, factory: F) -> Self {
        self.entries.insert(name, factory);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<&F> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name.trim()))
            .map(|(_, factory)| factory)
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "unknown {} '{}', expected one of: {}",
                    self.kind,
                    name,
                    self.names().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}
