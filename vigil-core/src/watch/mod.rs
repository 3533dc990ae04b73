//! Watch lifecycle management.
//!
//! `WatchService` keeps the live set of OS watches in exact correspondence
//! with the server's monitored-path list. Directories are watched directly;
//! a file target is watched through its parent directory with a name
//! filter. Every live watch is registered in an id-keyed table mapping the
//! handle back to its server-side path metadata, and the whole table is
//! swapped atomically on start/stop so concurrent dispatch tasks never see
//! a half-updated mapping.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vigil_model::MonitoredPath;

use crate::api::ApiClient;
use crate::categories::CategoryCache;
use crate::classify::ScanConfig;

pub(crate) mod dispatch;

use dispatch::DispatchContext;

const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// Identity of one live watch handle. Ids are never reused within a
/// process, so a stale id from before a restart can never alias a new
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

/// Metadata side of the handle table: which server path a watch serves and
/// the name filter for file targets.
#[derive(Debug)]
pub struct WatchEntry {
    pub meta: MonitoredPath,
    pub file_filter: Option<String>,
}

struct WatchMessage {
    entry: Arc<WatchEntry>,
    event: Event,
}

/// Per-session resources: the notify handles, the routing task, and the
/// delivery gate shared with every callback of this session.
struct WatchState {
    watchers: Vec<RecommendedWatcher>,
    router: Option<JoinHandle<()>>,
    gate: Arc<AtomicBool>,
}

impl WatchState {
    fn empty() -> Self {
        Self {
            watchers: Vec::new(),
            router: None,
            gate: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct WatchService {
    ctx: Arc<DispatchContext>,
    state: Mutex<WatchState>,
    registry: Arc<RwLock<HashMap<WatchId, Arc<WatchEntry>>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for WatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("WatchService");
        match self.registry.try_read() {
            Ok(guard) => debug.field("handle_count", &guard.len()),
            Err(_) => debug.field("registry", &"<locked>"),
        };
        debug.finish()
    }
}

impl WatchService {
    pub fn new(api: Arc<ApiClient>, categories: Arc<CategoryCache>, scan: ScanConfig) -> Self {
        Self {
            ctx: Arc::new(DispatchContext {
                api,
                categories,
                scan,
                computer_name: dispatch::computer_name(),
            }),
            state: Mutex::new(WatchState::empty()),
            registry: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Establish watches for the supplied snapshot, replacing any previous
    /// session. Per-path setup failures are skipped; returns the number of
    /// live handles.
    pub async fn start_all(&self, paths: Vec<MonitoredPath>) -> usize {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;
        self.start_locked(&mut state, paths).await
    }

    /// Disable event delivery and release every live watch. Idempotent.
    /// Classification and report tasks already in flight are left to finish
    /// on their own.
    pub async fn stop_all(&self) {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;
    }

    /// Stop everything, then start over from a fresh path-registry
    /// snapshot.
    pub async fn restart(&self) -> usize {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;
        let paths = self.ctx.api.load_paths().await;
        self.start_locked(&mut state, paths).await
    }

    /// True iff at least one watch handle is live.
    pub async fn is_active(&self) -> bool {
        !self.registry.read().await.is_empty()
    }

    pub async fn handle_count(&self) -> usize {
        self.registry.read().await.len()
    }

    async fn start_locked(&self, state: &mut WatchState, paths: Vec<MonitoredPath>) -> usize {
        let gate = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::channel::<WatchMessage>(WATCH_CHANNEL_CAPACITY);

        let mut next: HashMap<WatchId, Arc<WatchEntry>> = HashMap::new();
        let mut watchers = Vec::new();
        let mut seen_paths: HashSet<String> = HashSet::new();

        for meta in paths {
            // At most one live handle per monitored path.
            if !seen_paths.insert(meta.path.clone()) {
                continue;
            }

            let Some((root, mode, file_filter)) = resolve_watch_root(&meta) else {
                warn!(path = %meta.path, "watch target has no usable root, skipping");
                continue;
            };
            if !root.is_dir() {
                warn!(root = %root.display(), path = %meta.path, "watch root missing, skipping");
                continue;
            }

            let entry = Arc::new(WatchEntry {
                meta,
                file_filter,
            });
            match build_watcher(&root, mode, Arc::clone(&entry), tx.clone(), Arc::clone(&gate)) {
                Ok(watcher) => {
                    let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
                    info!(root = %root.display(), path = %entry.meta.path, "watching");
                    watchers.push(watcher);
                    next.insert(id, entry);
                }
                Err(err) => {
                    warn!(root = %root.display(), error = %err, "failed to establish watch, skipping");
                }
            }
        }
        drop(tx);

        let router_ctx = Arc::clone(&self.ctx);
        let router_gate = Arc::clone(&gate);
        let router = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if !router_gate.load(Ordering::Acquire) {
                    continue;
                }
                let changes =
                    dispatch::normalize(&message.event, message.entry.file_filter.as_deref());
                for (change_type, path) in changes {
                    let ctx = Arc::clone(&router_ctx);
                    let entry = Arc::clone(&message.entry);
                    tokio::spawn(dispatch::process_change(ctx, entry, change_type, path));
                }
            }
        });

        let count = next.len();
        *self.registry.write().await = next;
        state.watchers = watchers;
        state.router = Some(router);
        state.gate = gate;
        if count == 0 {
            info!("no watchable paths, monitoring inactive");
        }
        count
    }

    async fn stop_locked(&self, state: &mut WatchState) {
        state.gate.store(false, Ordering::Release);
        // Dropping the notify handles stops the OS watch streams and closes
        // the channel senders, which ends the router once drained.
        state.watchers.clear();
        if let Some(router) = state.router.take() {
            router.abort();
        }
        self.registry.write().await.clear();
    }
}

/// Resolve where the OS watch actually sits for a monitored path.
///
/// Directories are watched in place; a file target is watched through its
/// parent directory, non-recursive, filtered by its own name.
fn resolve_watch_root(meta: &MonitoredPath) -> Option<(PathBuf, RecursiveMode, Option<String>)> {
    let target = Path::new(&meta.path);
    if meta.is_directory {
        let mode = if meta.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        Some((target.to_path_buf(), mode, None))
    } else {
        let parent = target.parent().filter(|parent| !parent.as_os_str().is_empty())?;
        let name = meta.file_name()?;
        Some((parent.to_path_buf(), RecursiveMode::NonRecursive, Some(name)))
    }
}

fn build_watcher(
    root: &Path,
    mode: RecursiveMode,
    entry: Arc<WatchEntry>,
    tx: mpsc::Sender<WatchMessage>,
    gate: Arc<AtomicBool>,
) -> crate::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if !gate.load(Ordering::Acquire) {
                    return;
                }
                let message = WatchMessage {
                    entry: Arc::clone(&entry),
                    event,
                };
                // A send error means the session was torn down while the OS
                // still had events queued; those events die with it.
                let _ = tx.blocking_send(message);
            }
            Err(err) => warn!(error = %err, "watch stream error"),
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(root, mode)?;
    Ok(watcher)
}
