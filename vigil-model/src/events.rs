use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of observed filesystem change.
///
/// Renames never appear here: the dispatcher splits them into a `Deleted`
/// event for the old path and a `Created` event for the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Changed,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Changed => "changed",
            ChangeType::Deleted => "deleted",
        }
    }

    /// Whether an event of this kind still has a file on disk to inspect.
    pub fn is_classifiable(&self) -> bool {
        !matches!(self, ChangeType::Deleted)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified change, built per notification and sent exactly once.
///
/// Delivery is at-most-once: a failed report is dropped, never retried or
/// queued, so the struct carries no delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path_id: i64,
    pub change_type: ChangeType,
    pub file_path: String,
    pub timestamp_utc: DateTime<Utc>,
    pub new_size: Option<u64>,
    pub computer_name: String,
    pub category_id: Option<i64>,
    pub matched_keyword: Option<String>,
}
