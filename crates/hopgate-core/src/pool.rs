//! Static registry of database backends.

use crate::config::{BackendDescriptor, ConfigError};
use std::collections::HashSet;

/// Ordered set of backends with exactly one primary.
///
/// Every backend that is not the primary is a replica. The pool is built once
/// from configuration and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct BackendPool {
    backends: Vec<BackendDescriptor>,
    primary: usize,
}

impl BackendPool {
    /// Build a pool, checking that it is non-empty, names are unique and
    /// exactly one backend is marked primary.
    pub fn new(backends: Vec<BackendDescriptor>) -> Result<Self, ConfigError> {
        if backends.is_empty() {
            return Err(ConfigError::Invalid("backend pool is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for backend in &backends {
            if backend.name.is_empty() {
                return Err(ConfigError::Invalid("backend name must not be empty".to_string()));
            }
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate backend name '{}'",
                    backend.name
                )));
            }
        }

        let primaries: Vec<usize> = backends
            .iter()
            .enumerate()
            .filter(|(_, b)| b.primary)
            .map(|(i, _)| i)
            .collect();

        match primaries.as_slice() {
            [primary] => Ok(Self {
                primary: *primary,
                backends,
            }),
            [] => Err(ConfigError::Invalid(
                "no backend is marked primary".to_string(),
            )),
            _ => Err(ConfigError::Invalid(format!(
                "{} backends are marked primary, expected exactly one",
                primaries.len()
            ))),
        }
    }

    /// The write-capable backend.
    pub fn primary(&self) -> &BackendDescriptor {
        &self.backends[self.primary]
    }

    /// All backends except the primary, in configuration order.
    pub fn replicas(&self) -> Vec<&BackendDescriptor> {
        self.backends
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.primary)
            .map(|(_, b)| b)
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&BackendDescriptor> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
