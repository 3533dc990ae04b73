//! Time-boxed cache of the server's category definitions.
//!
//! Categories change rarely, so the engine refreshes them at most every
//! five minutes. A failed refresh serves whatever was cached before, stale
//! or not; classification with slightly old rules beats classification
//! with none.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};
use vigil_model::Category;

use crate::api::ApiClient;

pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
pub struct CategoryCache {
    api: Arc<ApiClient>,
    slot: RwLock<Option<Slot>>,
}

#[derive(Debug)]
struct Slot {
    categories: Vec<Category>,
    fetched_at: Instant,
}

impl CategoryCache {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            slot: RwLock::new(None),
        }
    }

    /// Current category list, refreshing first when the cache is empty or
    /// older than the TTL. On refresh failure the previous value is served;
    /// an empty list if nothing was ever cached.
    pub async fn get(&self) -> Vec<Category> {
        {
            let slot = self.slot.read().await;
            if let Some(slot) = slot.as_ref()
                && slot.fetched_at.elapsed() < CACHE_TTL
            {
                return slot.categories.clone();
            }
        }

        let mut slot = self.slot.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(slot) = slot.as_ref()
            && slot.fetched_at.elapsed() < CACHE_TTL
        {
            return slot.categories.clone();
        }

        match self.api.fetch_categories().await {
            Ok(categories) => {
                debug!(count = categories.len(), "category cache refreshed");
                *slot = Some(Slot {
                    categories: categories.clone(),
                    fetched_at: Instant::now(),
                });
                categories
            }
            Err(err) => {
                warn!(error = %err, "category refresh failed, serving cached value");
                slot.as_ref()
                    .map(|slot| slot.categories.clone())
                    .unwrap_or_default()
            }
        }
    }

    /// Proactive refresh, used right after a successful login. Errors are
    /// swallowed; the next `get` will retry.
    pub async fn refresh(&self) {
        match self.api.fetch_categories().await {
            Ok(categories) => {
                *self.slot.write().await = Some(Slot {
                    categories,
                    fetched_at: Instant::now(),
                });
            }
            Err(err) => warn!(error = %err, "proactive category refresh failed"),
        }
    }

    /// Drop the cached value. Called on logout.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}
