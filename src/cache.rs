mod store;
mod types;

pub use store::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use types::CacheEntry;

use chrono::TimeDelta;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::model::{AnalysisResponse, RepoKey};

pub const CACHE_TTL_HOURS: i64 = 24;

pub fn cache_key(key: &RepoKey) -> String {
    format!(
        "cache/{}_{}.json",
        key.owner.to_lowercase(),
        key.repo.to_lowercase()
    )
}

/// Read-through store of finished analyses. Every failure in here degrades
/// to a miss or a no-op with a warning; callers never see cache errors.
#[derive(Clone)]
pub struct AnalysisCache {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
}

impl AnalysisCache {
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl: TimeDelta::hours(CACHE_TTL_HOURS),
        }
    }

    pub async fn get(&self, key: &RepoKey) -> Option<AnalysisResponse> {
        let object_key = cache_key(key);

        let bytes = match self.store.read(&object_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(repo = %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(repo = %key, error = %format!("{e:#}"), "cache read failed");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(repo = %key, error = %e, "cache entry is corrupt, ignoring");
                return None;
            }
        };

        let now = self.clock.now();
        if entry.is_expired(now, self.ttl) {
            info!(
                repo = %key,
                age_hours = entry.age(now).num_hours(),
                "cache entry expired"
            );
            self.evict_in_background(object_key);
            return None;
        }

        info!(
            repo = %key,
            age_minutes = entry.age(now).num_minutes(),
            "cache hit"
        );
        Some(entry.data)
    }

    pub async fn put(&self, key: &RepoKey, data: &AnalysisResponse) -> bool {
        let entry = CacheEntry {
            key: key.normalized(),
            cached_at: self.clock.now(),
            data: data.clone(),
        };

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(repo = %key, error = %e, "failed to serialize cache entry");
                return false;
            }
        };
        let size = bytes.len();

        match self.store.write(&cache_key(key), bytes).await {
            Ok(()) => {
                info!(repo = %key, size_kb = size as f64 / 1024.0, "cached analysis");
                true
            }
            Err(e) => {
                warn!(repo = %key, error = %format!("{e:#}"), "cache write failed");
                false
            }
        }
    }

    pub async fn delete(&self, key: &RepoKey) -> bool {
        match self.store.delete(&cache_key(key)).await {
            Ok(removed) => {
                if removed {
                    info!(repo = %key, "cleared cache");
                } else {
                    debug!(repo = %key, "no cache to clear");
                }
                removed
            }
            Err(e) => {
                warn!(repo = %key, error = %format!("{e:#}"), "cache delete failed");
                false
            }
        }
    }

    fn evict_in_background(&self, object_key: String) {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let ttl = self.ttl;
        tokio::spawn(async move {
            evict_if_stale(store.as_ref(), clock.as_ref(), ttl, &object_key).await;
        });
    }
}

/// Deletes `object_key` only if the entry stored there right now is still
/// expired. A fresh write that landed after the stale read survives.
async fn evict_if_stale(
    store: &dyn ObjectStore,
    clock: &dyn Clock,
    ttl: TimeDelta,
    object_key: &str,
) -> bool {
    let still_stale = match store.read(object_key).await {
        Ok(Some(bytes)) => match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => entry.is_expired(clock.now(), ttl),
            // Unreadable entries are never served, so they can go too.
            Err(_) => true,
        },
        Ok(None) => false,
        Err(e) => {
            warn!(key = %object_key, error = %format!("{e:#}"), "failed to re-read expired cache");
            false
        }
    };
    if !still_stale {
        debug!(key = %object_key, "cache entry refreshed before eviction, keeping it");
        return false;
    }

    match store.delete(object_key).await {
        Ok(removed) => removed,
        Err(e) => {
            warn!(key = %object_key, error = %format!("{e:#}"), "failed to delete expired cache");
            false
        }
    }
}
