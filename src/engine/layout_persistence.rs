//! Layout persistence manager.
//!
//! Moves a [`CanvasLayout`] between runtime state and the two stores: a
//! same-device [`LayoutCache`] slot holding JSON, and a
//! [`RemoteLayoutStore`] taking structured payloads. When both hold a copy,
//! the configured [`ConflictStrategy`] decides which one the canvas sees.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;

use crate::config::{CanvasConfig, ConflictStrategy};
use crate::db::models::{CanvasLayout, FetchLayoutRequest, SaveLayoutRequest};
use crate::db::settings_keys;
use crate::engine::geometry;
use crate::engine::layout_merge::{merge_layouts, NormalizedLayout};
use crate::engine::layout_store::{ConflictResolver, LayoutCache, RemoteLayoutStore};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct PersistenceOptions {
    pub enable_local_cache: bool,
    pub enable_remote: bool,
    pub conflict_strategy: ConflictStrategy,
    pub remote_timeout: Duration,
}

impl From<&CanvasConfig> for PersistenceOptions {
    fn from(config: &CanvasConfig) -> Self {
        Self {
            enable_local_cache: config.enable_local_cache,
            enable_remote: config.enable_remote,
            conflict_strategy: config.conflict_strategy,
            remote_timeout: config.remote_timeout(),
        }
    }
}

/// Where a loaded layout came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LayoutSource {
    Local,
    Remote,
    Merged,
    /// Chosen by the injected conflict resolver.
    Resolved,
}

#[derive(Debug, Clone)]
pub struct LoadedLayout {
    pub layout: CanvasLayout,
    pub source: LayoutSource,
    /// Team roster reported by the remote store, when it was reached.
    pub teams: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub saved_at: DateTime<Utc>,
    pub positions_saved: u32,
    pub connections_saved: u32,
}

pub struct LayoutPersistence {
    options: PersistenceOptions,
    user_id: String,
    workspace_id: Option<String>,
    cache: Option<Arc<dyn LayoutCache>>,
    remote: Option<Arc<dyn RemoteLayoutStore>>,
    resolver: Option<Arc<dyn ConflictResolver>>,
    baseline: Mutex<Option<NormalizedLayout>>,
}

impl LayoutPersistence {
    pub fn new(options: PersistenceOptions, user_id: impl Into<String>, workspace_id: Option<String>) -> Self {
        Self {
            options,
            user_id: user_id.into(),
            workspace_id,
            cache: None,
            remote: None,
            resolver: None,
            baseline: Mutex::new(None),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn LayoutCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteLayoutStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn workspace_id(&self) -> Option<&str> {
        self.workspace_id.as_deref()
    }

    fn cache_key(&self) -> String {
        settings_keys::canvas_layout_cache_key(self.workspace_id.as_deref())
    }

    fn active_cache(&self) -> Option<&Arc<dyn LayoutCache>> {
        self.cache.as_ref().filter(|_| self.options.enable_local_cache)
    }

    fn active_remote(&self) -> Option<&Arc<dyn RemoteLayoutStore>> {
        self.remote.as_ref().filter(|_| self.options.enable_remote)
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Read both copies and reconcile them.
    ///
    /// A copy that fails to load is logged and skipped as long as another
    /// configured source answers; if every configured source fails, the last
    /// error is returned. `Ok(None)` means nothing has been saved yet.
    pub async fn load(&self) -> Result<Option<LoadedLayout>, AppError> {
        let mut attempted = 0usize;
        let mut failures = 0usize;
        let mut last_error = None;

        let local = match self.active_cache() {
            Some(cache) => {
                attempted += 1;
                match self.read_local(cache).await {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read cached canvas layout");
                        failures += 1;
                        last_error = Some(e);
                        None
                    }
                }
            }
            None => None,
        };

        let (remote, teams) = match self.active_remote() {
            Some(store) => {
                attempted += 1;
                match self.fetch_remote(store.as_ref()).await {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!(store = store.name(), error = %e, "Failed to fetch remote canvas layout");
                        failures += 1;
                        last_error = Some(e);
                        (None, None)
                    }
                }
            }
            None => (None, None),
        };

        if attempted > 0 && failures == attempted {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let (local, remote) = match &teams {
            Some(roster) => (
                local.map(|l| filter_to_roster(l, roster, "local")),
                remote.map(|r| filter_to_roster(r, roster, "remote")),
            ),
            None => (local, remote),
        };

        let (layout, source) = match (local, remote) {
            (None, None) => {
                tracing::debug!(workspace = ?self.workspace_id, "No saved canvas layout");
                return Ok(None);
            }
            (Some(layout), None) => (layout, LayoutSource::Local),
            (None, Some(layout)) => (layout, LayoutSource::Remote),
            (Some(local), Some(remote)) => {
                let stored = [NormalizedLayout::from_layout(&local), NormalizedLayout::from_layout(&remote)];
                let (layout, source) = self.resolve_conflict(local, remote).await?;
                // A merged or hand-picked result is only "saved" if both copies already hold it.
                let resolved = NormalizedLayout::from_layout(&layout);
                if stored.iter().all(|copy| *copy == resolved) {
                    self.set_baseline(Some(resolved))?;
                }
                (layout, source)
            }
        };

        if matches!(source, LayoutSource::Local | LayoutSource::Remote) {
            self.set_baseline(Some(NormalizedLayout::from_layout(&layout)))?;
        }

        tracing::info!(
            source = ?source,
            positions = layout.positions.len(),
            connections = layout.connections.len(),
            "Canvas layout loaded"
        );
        Ok(Some(LoadedLayout { layout, source, teams }))
    }

    async fn read_local(&self, cache: &Arc<dyn LayoutCache>) -> Result<Option<CanvasLayout>, AppError> {
        let key = self.cache_key();
        let Some(raw) = on_cache(cache, move |c| c.get(&key)).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<CanvasLayout>(&raw) {
            Ok(layout) => Ok(Some(layout)),
            Err(e) => {
                tracing::warn!(error = %e, key = %self.cache_key(), "Ignoring malformed cached canvas layout");
                Ok(None)
            }
        }
    }

    async fn fetch_remote(
        &self,
        store: &dyn RemoteLayoutStore,
    ) -> Result<(Option<CanvasLayout>, Option<Vec<String>>), AppError> {
        let request = FetchLayoutRequest {
            user_id: self.user_id.clone(),
            workspace_id: self.workspace_id.clone(),
        };
        let response = tokio::time::timeout(self.options.remote_timeout, store.fetch_layout(request))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "fetching canvas layout from {} after {}ms",
                    store.name(),
                    self.options.remote_timeout.as_millis()
                ))
            })??;

        if !response.success {
            return Err(AppError::Remote(
                response.error.unwrap_or_else(|| "fetch layout failed".into()),
            ));
        }
        Ok((response.layout, response.teams))
    }

    async fn resolve_conflict(
        &self,
        local: CanvasLayout,
        remote: CanvasLayout,
    ) -> Result<(CanvasLayout, LayoutSource), AppError> {
        match self.options.conflict_strategy {
            ConflictStrategy::LocalWins => Ok((local, LayoutSource::Local)),
            ConflictStrategy::RemoteWins => Ok((remote, LayoutSource::Remote)),
            ConflictStrategy::Merge => Ok((merge_layouts(&local, &remote), LayoutSource::Merged)),
            ConflictStrategy::AskUser => match &self.resolver {
                Some(resolver) => {
                    let chosen = resolver.resolve(&local, &remote).await?;
                    Ok((chosen, LayoutSource::Resolved))
                }
                None => {
                    tracing::warn!("ask_user conflict strategy has no resolver; using the remote copy");
                    Ok((remote, LayoutSource::Remote))
                }
            },
        }
    }

    // ========================================================================
    // Save
    // ========================================================================

    /// Stamp and write `layout` to every configured store.
    ///
    /// Both stores are attempted. If either fails, the first error is
    /// returned and the baseline is left unchanged.
    pub async fn save(&self, layout: &CanvasLayout) -> Result<SaveOutcome, AppError> {
        let now = Utc::now();
        let mut stamped = layout.clone();
        stamped.updated_at = now;
        stamped.user_id = self.user_id.clone();
        stamped.workspace_id = self.workspace_id.clone();

        let mut outcome = SaveOutcome {
            saved_at: now,
            positions_saved: stamped.positions.len() as u32,
            connections_saved: stamped.connections.len() as u32,
        };
        let mut first_error: Option<AppError> = None;

        if let Some(cache) = self.active_cache() {
            let key = self.cache_key();
            let written = match serde_json::to_string(&stamped) {
                Ok(json) => on_cache(cache, move |c| c.set(&key, &json)).await,
                Err(e) => Err(AppError::from(e)),
            };
            if let Err(e) = written {
                tracing::error!(error = %e, "Failed to write canvas layout to local cache");
                first_error.get_or_insert(e);
            }
        }

        if let Some(store) = self.active_remote() {
            match self.push_remote(store.as_ref(), &stamped).await {
                Ok((positions, connections, saved_at)) => {
                    outcome.positions_saved = positions;
                    outcome.connections_saved = connections;
                    if let Some(at) = saved_at {
                        outcome.saved_at = at;
                    }
                }
                Err(e) => {
                    tracing::error!(store = store.name(), error = %e, "Failed to save canvas layout remotely");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        self.set_baseline(Some(NormalizedLayout::from_layout(&stamped)))?;
        tracing::debug!(
            positions = outcome.positions_saved,
            connections = outcome.connections_saved,
            "Canvas layout saved"
        );
        Ok(outcome)
    }

    async fn push_remote(
        &self,
        store: &dyn RemoteLayoutStore,
        layout: &CanvasLayout,
    ) -> Result<(u32, u32, Option<DateTime<Utc>>), AppError> {
        let request = SaveLayoutRequest {
            user_id: layout.user_id.clone(),
            workspace_id: layout.workspace_id.clone(),
            positions: layout.positions.clone(),
            connections: layout.connections.clone(),
            view: layout.view,
            updated_at: layout.updated_at,
        };
        let response = tokio::time::timeout(self.options.remote_timeout, store.save_layout(request))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "saving canvas layout to {} after {}ms",
                    store.name(),
                    self.options.remote_timeout.as_millis()
                ))
            })??;

        if !response.success {
            let mut message = response.error.unwrap_or_else(|| "save layout failed".into());
            if !response.validation_errors.is_empty() {
                let details: Vec<String> = response
                    .validation_errors
                    .iter()
                    .map(|fe| format!("{}: {}", fe.field, fe.message))
                    .collect();
                message = format!("{message} ({})", details.join("; "));
            }
            return Err(AppError::Remote(message));
        }
        Ok((response.positions_saved, response.connections_saved, response.saved_at))
    }

    // ========================================================================
    // Baseline + utilities
    // ========================================================================

    /// True when nothing has been saved or loaded yet, or when `current`
    /// differs from the last baseline after normalization.
    pub fn has_unsaved_changes(&self, current: &CanvasLayout) -> Result<bool, AppError> {
        let baseline = self.lock_baseline()?;
        Ok(match baseline.as_ref() {
            Some(saved) => *saved != NormalizedLayout::from_layout(current),
            None => true,
        })
    }

    pub fn baseline(&self) -> Result<Option<NormalizedLayout>, AppError> {
        Ok(self.lock_baseline()?.clone())
    }

    /// Drop the cached slot for this workspace. Returns whether one existed.
    pub fn clear_local_cache(&self) -> Result<bool, AppError> {
        match &self.cache {
            Some(cache) => {
                let removed = cache.remove(&self.cache_key())?;
                tracing::info!(key = %self.cache_key(), removed, "Cleared cached canvas layout");
                Ok(removed)
            }
            None => Ok(false),
        }
    }

    pub fn export_json(&self, layout: &CanvasLayout) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(layout)?)
    }

    /// Parse an exported layout. Out-of-range positions are rejected.
    pub fn import_json(&self, raw: &str) -> Result<CanvasLayout, AppError> {
        let layout: CanvasLayout = serde_json::from_str(raw)?;
        if let Some(bad) = layout
            .positions
            .iter()
            .find(|p| !geometry::is_valid_position(p.x, p.y))
        {
            return Err(AppError::Validation(format!(
                "Position for team {} is out of range ({}, {})",
                bad.team_id, bad.x, bad.y
            )));
        }
        Ok(layout)
    }

    fn lock_baseline(&self) -> Result<std::sync::MutexGuard<'_, Option<NormalizedLayout>>, AppError> {
        self.baseline
            .lock()
            .map_err(|_| AppError::Internal("layout baseline lock poisoned".into()))
    }

    fn set_baseline(&self, value: Option<NormalizedLayout>) -> Result<(), AppError> {
        *self.lock_baseline()? = value;
        Ok(())
    }
}

/// Run a blocking cache call on the blocking pool.
async fn on_cache<T, F>(cache: &Arc<dyn LayoutCache>, op: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&dyn LayoutCache) -> Result<T, AppError> + Send + 'static,
{
    let cache = Arc::clone(cache);
    tokio::task::spawn_blocking(move || op(cache.as_ref()))
        .await
        .map_err(|e| AppError::Internal(format!("layout cache task failed: {e}")))?
}

/// Drop connections whose endpoints are not in the backend's roster.
fn filter_to_roster(mut layout: CanvasLayout, roster: &[String], copy: &str) -> CanvasLayout {
    let known: HashSet<&str> = roster.iter().map(String::as_str).collect();
    layout.connections.retain(|c| {
        let ok = known.contains(c.source_team_id.as_str()) && known.contains(c.target_team_id.as_str());
        if !ok {
            tracing::warn!(
                copy,
                id = %c.id,
                source = %c.source_team_id,
                target = %c.target_team_id,
                "Filtering connection that references a team missing from the roster"
            );
        }
        ok
    });
    layout
}
