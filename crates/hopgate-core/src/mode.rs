//! Backend selection modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Strategy used by the router hop to pick a backend for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Uniformly random replica.
    #[default]
    Random,
    /// Always the primary.
    DirectHit,
    /// Replica with the lowest probed latency.
    Customized,
    /// Reads to a random replica, everything else to the primary.
    LoadBalance,
}

/// A selection mode name outside the four recognized values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown selection mode '{0}' (expected random, directhit, customized or loadbalance)")]
pub struct UnknownModeError(pub String);

impl SelectionMode {
    pub const ALL: [SelectionMode; 4] = [
        SelectionMode::Random,
        SelectionMode::DirectHit,
        SelectionMode::Customized,
        SelectionMode::LoadBalance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Random => "random",
            SelectionMode::DirectHit => "directhit",
            SelectionMode::Customized => "customized",
            SelectionMode::LoadBalance => "loadbalance",
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| UnknownModeError(s.to_string()))
    }
}
