use std::path::Path;

use serde::{Deserialize, Serialize};

/// One watch target as defined on the server.
///
/// The `id` is the server-assigned identity and is echoed back on every
/// reported event. A `MonitoredPath` is immutable for the lifetime of a
/// watch session; editing the path list on the server produces a fresh
/// snapshot and a watcher restart.
///
/// The aliases tolerate the PascalCase spellings older server builds used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredPath {
    #[serde(alias = "Id")]
    pub id: i64,
    #[serde(alias = "Path")]
    pub path: String,
    #[serde(default, alias = "IsDirectory")]
    pub is_directory: bool,
    #[serde(default = "default_recursive", alias = "Recursive")]
    pub recursive: bool,
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
}

fn default_recursive() -> bool {
    true
}

impl MonitoredPath {
    /// Base name of a file target, used as the notification filter when the
    /// watch is placed on the parent directory. `None` for directory targets.
    pub fn file_name(&self) -> Option<String> {
        if self.is_directory {
            return None;
        }
        Path::new(&self.path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}
