//! Storage seams for canvas layouts.
//!
//! `RemoteLayoutStore` is the request/response contract with the hosted
//! backend; `LayoutCache` is the same-device key-value fallback. Both are
//! injected into [`LayoutPersistence`](super::layout_persistence::LayoutPersistence).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::models::{
    CanvasLayout, FetchLayoutRequest, FetchLayoutResponse, SaveLayoutRequest, SaveLayoutResponse,
};
use crate::db::repos::settings;
use crate::db::DbPool;
use crate::error::AppError;

// ── Remote store ───────────────────────────────────────────────────

/// Hosted relational store for layouts, keyed by workspace and user.
#[async_trait]
pub trait RemoteLayoutStore: Send + Sync {
    /// Short name for logs ("http", "sqlite", ...).
    fn name(&self) -> &'static str;

    async fn fetch_layout(&self, request: FetchLayoutRequest) -> Result<FetchLayoutResponse, AppError>;

    async fn save_layout(&self, request: SaveLayoutRequest) -> Result<SaveLayoutResponse, AppError>;
}

// ── Conflict resolver ──────────────────────────────────────────────

/// Decides between a local and a remote copy when the strategy is `ask_user`.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn resolve(&self, local: &CanvasLayout, remote: &CanvasLayout) -> Result<CanvasLayout, AppError>;
}

// ── Local cache ────────────────────────────────────────────────────

/// A string-keyed slot store. One slot per workspace holds a JSON layout.
pub trait LayoutCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    /// Returns whether a slot was removed.
    fn remove(&self, key: &str) -> Result<bool, AppError>;
}

/// Cache backed by the `app_settings` table of the local database.
pub struct SettingsLayoutCache {
    pool: DbPool,
}

impl SettingsLayoutCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl LayoutCache for SettingsLayoutCache {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        settings::get(&self.pool, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        settings::set(&self.pool, key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, AppError> {
        settings::delete(&self.pool, key)
    }
}

/// Process-local cache, for embedding without a database and for tests.
#[derive(Default)]
pub struct MemoryLayoutCache {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AppError> {
        self.slots
            .lock()
            .map_err(|_| AppError::Internal("layout cache lock poisoned".into()))
    }
}

impl LayoutCache for MemoryLayoutCache {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.slots()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.slots()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.slots()?.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;

    fn exercise(cache: &dyn LayoutCache) {
        assert_eq!(cache.get("canvas_layout:ws").unwrap(), None);
        cache.set("canvas_layout:ws", "{\"a\":1}").unwrap();
        assert_eq!(cache.get("canvas_layout:ws").unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(cache.remove("canvas_layout:ws").unwrap());
        assert!(!cache.remove("canvas_layout:ws").unwrap());
    }

    #[test]
    fn memory_cache_slots() {
        exercise(&MemoryLayoutCache::new());
    }

    #[test]
    fn settings_cache_slots() {
        let pool = init_test_db().unwrap();
        exercise(&SettingsLayoutCache::new(pool));
    }
}
