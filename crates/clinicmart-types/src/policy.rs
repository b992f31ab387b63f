//! Warehouse refresh policies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a destination table is refreshed on each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Insert all rows. No deduplication: re-running a window duplicates it.
    Append,
    /// Delete the run's window, then insert the new rows, in one transaction.
    ReplaceWindow,
    /// Atomically swap the whole table for the run's rows.
    Replace,
}

impl RefreshPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::ReplaceWindow => "replace_window",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
