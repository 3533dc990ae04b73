//! Notification normalization and the per-event report cycle.
//!
//! Raw notify events are flattened into `(ChangeType, path)` pairs; a
//! rename always fans out into an independent delete/create pair, each
//! classified on its own. Every pair becomes one spawned task that sizes,
//! classifies, and reports the change without ever blocking the watcher
//! callback.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use notify::Event;
use notify::event::{EventKind, ModifyKind, RenameMode};
use tracing::debug;
use vigil_model::{ChangeEvent, ChangeType};

use crate::api::ApiClient;
use crate::categories::CategoryCache;
use crate::classify::{self, ScanConfig};

use super::WatchEntry;

/// Shared collaborators for in-flight dispatch tasks.
#[derive(Debug)]
pub(crate) struct DispatchContext {
    pub(crate) api: Arc<ApiClient>,
    pub(crate) categories: Arc<CategoryCache>,
    pub(crate) scan: ScanConfig,
    pub(crate) computer_name: String,
}

/// Flatten one notify event into reportable changes.
///
/// `name_filter` is the base name of a file target whose watch sits on the
/// parent directory; unrelated siblings are dropped here. Directory changes
/// inside a recursive watch are noise and are dropped too (a deletion can
/// no longer be stat'd, so it always passes).
pub(crate) fn normalize(event: &Event, name_filter: Option<&str>) -> Vec<(ChangeType, PathBuf)> {
    let mut changes: Vec<(ChangeType, PathBuf)> = Vec::new();
    let mut paths = event.paths.iter().cloned();

    match &event.kind {
        EventKind::Create(_) => {
            if let Some(path) = paths.next() {
                changes.push((ChangeType::Created, path));
            }
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both => {
                if let Some(old) = paths.next() {
                    changes.push((ChangeType::Deleted, old));
                }
                if let Some(new) = paths.next() {
                    changes.push((ChangeType::Created, new));
                }
            }
            RenameMode::From => {
                if let Some(old) = paths.next() {
                    changes.push((ChangeType::Deleted, old));
                }
            }
            RenameMode::To => {
                if let Some(new) = paths.next() {
                    changes.push((ChangeType::Created, new));
                }
            }
            // Some backends only report that a name changed; existence of
            // the path decides which half of the split this is.
            RenameMode::Any | RenameMode::Other => {
                if let Some(path) = paths.next() {
                    if path.exists() {
                        changes.push((ChangeType::Created, path));
                    } else {
                        changes.push((ChangeType::Deleted, path));
                    }
                }
            }
        },
        EventKind::Modify(_) => {
            if let Some(path) = paths.next() {
                changes.push((ChangeType::Changed, path));
            }
        }
        EventKind::Remove(_) => {
            if let Some(path) = paths.next() {
                changes.push((ChangeType::Deleted, path));
            }
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }

    changes.retain(|(change_type, path)| {
        if let Some(filter) = name_filter {
            let matches = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy() == filter);
            if !matches {
                return false;
            }
        }
        !(change_type.is_classifiable() && path.is_dir())
    });

    changes
}

/// One full build-and-report cycle for a single observed change.
///
/// Failures end here: a vanished file is a no-match, a failed report is
/// dropped. Nothing propagates back into the watcher.
pub(crate) async fn process_change(
    ctx: Arc<DispatchContext>,
    entry: Arc<WatchEntry>,
    change_type: ChangeType,
    path: PathBuf,
) {
    let new_size = if change_type.is_classifiable() {
        tokio::fs::metadata(&path).await.ok().map(|meta| meta.len())
    } else {
        None
    };

    let classification = if change_type.is_classifiable() {
        let categories = ctx.categories.get().await;
        classify::classify(&path, change_type, &categories, &ctx.scan).await
    } else {
        None
    };
    let (category_id, matched_keyword) = match classification {
        Some(hit) => (Some(hit.category_id), Some(hit.matched_keyword)),
        None => (None, None),
    };

    let event = ChangeEvent {
        path_id: entry.meta.id,
        change_type,
        file_path: path.to_string_lossy().into_owned(),
        timestamp_utc: Utc::now(),
        new_size,
        computer_name: ctx.computer_name.clone(),
        category_id,
        matched_keyword,
    };

    debug!(
        path = %event.file_path,
        change = %event.change_type,
        category = ?event.category_id,
        "reporting change event"
    );
    if let Err(err) = ctx.api.report_event(&event).await {
        debug!(error = %err, "change event dropped");
    }
}

pub(crate) fn computer_name() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
