//! Canvas session: the callback surface the presentation layer talks to.
//!
//! Wires one [`CanvasStore`], its [`LayoutPersistence`] and a
//! [`SaveDebouncer`] together. Every gesture callback mutates the store and,
//! when auto-save is on, restarts the debounce window.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use ts_rs::TS;

use crate::config::CanvasConfig;
use crate::db::models::{
    CanvasLayout, ConnectionPatch, DisplayOptions, NewConnection, TeamConnection, TeamPosition,
    ViewSettings,
};
use crate::engine::canvas_store::{CanvasStats, CanvasStore, ReconcileReport};
use crate::engine::connection_graph::{BatchResult, ConnectionRejection, HierarchyNode};
use crate::engine::geometry::{self, HierarchyLayoutOptions};
use crate::engine::layout_persistence::{LayoutPersistence, LayoutSource, SaveOutcome};
use crate::engine::save_debouncer::{lock_store, SaveDebouncer, SaveStatus, SharedCanvasStore};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    /// `None` when nothing was saved and the default grid was generated.
    pub source: Option<LayoutSource>,
    pub reconcile: ReconcileReport,
}

pub struct CanvasSession {
    config: CanvasConfig,
    store: SharedCanvasStore,
    persistence: Arc<LayoutPersistence>,
    debouncer: SaveDebouncer,
}

impl CanvasSession {
    pub fn new(config: CanvasConfig, persistence: LayoutPersistence) -> Result<Self, AppError> {
        config.validate()?;
        let store = CanvasStore::new(
            config.clone(),
            persistence.user_id().to_string(),
            persistence.workspace_id().map(str::to_string),
            &[],
            None,
        );
        let store = Arc::new(Mutex::new(store));
        let persistence = Arc::new(persistence);
        let debouncer = SaveDebouncer::new(store.clone(), persistence.clone(), config.auto_save_debounce());
        Ok(Self {
            config,
            store,
            persistence,
            debouncer,
        })
    }

    /// Shared handle for readers that want to render or subscribe.
    pub fn store(&self) -> SharedCanvasStore {
        self.store.clone()
    }

    pub fn persistence(&self) -> &LayoutPersistence {
        &self.persistence
    }

    pub fn snapshot(&self) -> Result<CanvasLayout, AppError> {
        Ok(lock_store(&self.store)?.layout())
    }

    pub fn stats(&self) -> Result<CanvasStats, AppError> {
        Ok(lock_store(&self.store)?.stats())
    }

    pub fn hierarchy(&self, root: Option<&str>) -> Result<Vec<HierarchyNode>, AppError> {
        Ok(lock_store(&self.store)?.hierarchy(root))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load the saved layout for `teams`, then reconcile against the roster.
    ///
    /// With nothing saved, the default grid is generated and the store stays clean.
    /// A merged or resolved layout that neither stored copy holds yet starts dirty.
    pub async fn load(&self, teams: &[String]) -> Result<LoadReport, AppError> {
        let loaded = self.persistence.load().await?;

        let mut unsaved = false;
        let report = {
            let mut store = lock_store(&self.store)?;
            let source = match loaded {
                Some(loaded) => {
                    unsaved = self.persistence.has_unsaved_changes(&loaded.layout)?;
                    store.replace_layout(teams, loaded.layout, unsaved);
                    Some(loaded.source)
                }
                None => {
                    let now = Utc::now();
                    let mut fresh = CanvasLayout::empty(
                        self.persistence.user_id(),
                        self.persistence.workspace_id().map(str::to_string),
                        now,
                    );
                    fresh.positions = geometry::default_layout(teams, now);
                    store.replace_layout(teams, fresh, false);
                    None
                }
            };
            let reconcile = store.reconcile_teams(teams);
            LoadReport { source, reconcile }
        };

        if unsaved || !report.reconcile.is_noop() {
            self.schedule_save()?;
        }
        Ok(report)
    }

    /// Re-sync with a roster change made elsewhere.
    pub fn reconcile_teams(&self, teams: &[String]) -> Result<ReconcileReport, AppError> {
        let report = lock_store(&self.store)?.reconcile_teams(teams);
        if !report.is_noop() {
            self.schedule_save()?;
        }
        Ok(report)
    }

    /// Cancel the debounce timer and write any pending change.
    pub async fn save_now(&self) -> Result<Option<SaveOutcome>, AppError> {
        self.debouncer.flush().await
    }

    /// Persist pending work before the session goes away.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        if let Some(outcome) = self.debouncer.flush().await? {
            tracing::info!(saved_at = %outcome.saved_at, "Flushed canvas layout on shutdown");
        }
        Ok(())
    }

    pub fn save_status(&self) -> Result<SaveStatus, AppError> {
        self.debouncer.status()
    }

    pub fn has_unsaved_changes(&self) -> Result<bool, AppError> {
        let layout = self.snapshot()?;
        self.persistence.has_unsaved_changes(&layout)
    }

    // ========================================================================
    // Gesture callbacks
    // ========================================================================

    pub fn on_node_drag_stop(&self, team_id: &str, x: f64, y: f64) -> Result<TeamPosition, AppError> {
        let position = lock_store(&self.store)?.upsert_position(team_id, x, y)?;
        self.schedule_save()?;
        Ok(position)
    }

    /// The outer error is infrastructure; the inner one is a graph rule the user broke.
    pub fn on_connect(
        &self,
        request: NewConnection,
    ) -> Result<Result<TeamConnection, ConnectionRejection>, AppError> {
        let result = lock_store(&self.store)?.add_connection(request);
        match &result {
            Ok(_) => self.schedule_save()?,
            Err(rejection) => tracing::debug!(reason = rejection.reason.as_str(), "{}", rejection.message),
        }
        Ok(result)
    }

    pub fn on_connect_many(&self, requests: Vec<NewConnection>) -> Result<BatchResult, AppError> {
        let result = lock_store(&self.store)?.add_connections(requests);
        if !result.created.is_empty() {
            self.schedule_save()?;
        }
        Ok(result)
    }

    pub fn on_edge_change(
        &self,
        edge_id: &str,
        patch: ConnectionPatch,
    ) -> Result<Result<Option<TeamConnection>, ConnectionRejection>, AppError> {
        let result = lock_store(&self.store)?.update_connection(edge_id, patch);
        if matches!(result, Ok(Some(_))) {
            self.schedule_save()?;
        }
        Ok(result)
    }

    pub fn on_edge_delete(&self, edge_id: &str) -> Result<bool, AppError> {
        let removed = lock_store(&self.store)?.remove_connection(edge_id);
        if removed {
            self.schedule_save()?;
        }
        Ok(removed)
    }

    pub fn on_selection_change(&self, teams: Vec<String>, connections: Vec<String>) -> Result<(), AppError> {
        lock_store(&self.store)?.set_selection(teams, connections);
        Ok(())
    }

    pub fn delete_selected(&self) -> Result<usize, AppError> {
        let removed = lock_store(&self.store)?.remove_selected_connections();
        if removed > 0 {
            self.schedule_save()?;
        }
        Ok(removed)
    }

    pub fn on_viewport_change(&self, view: ViewSettings) -> Result<ViewSettings, AppError> {
        let view = lock_store(&self.store)?.set_viewport(view);
        self.schedule_save()?;
        Ok(view)
    }

    // ========================================================================
    // Toolbar actions
    // ========================================================================

    pub fn zoom_in(&self) -> Result<ViewSettings, AppError> {
        let view = lock_store(&self.store)?.zoom_by(1);
        self.schedule_save()?;
        Ok(view)
    }

    pub fn zoom_out(&self) -> Result<ViewSettings, AppError> {
        let view = lock_store(&self.store)?.zoom_by(-1);
        self.schedule_save()?;
        Ok(view)
    }

    pub fn fit_view(&self, container_width: f64, container_height: f64) -> Result<Option<ViewSettings>, AppError> {
        let view = lock_store(&self.store)?.fit_to_viewport(container_width, container_height);
        if view.is_some() {
            self.schedule_save()?;
        }
        Ok(view)
    }

    pub fn set_display(&self, display: DisplayOptions) -> Result<(), AppError> {
        lock_store(&self.store)?.set_display(display);
        Ok(())
    }

    pub fn reset_layout(&self) -> Result<(), AppError> {
        lock_store(&self.store)?.reset_layout();
        self.schedule_save()
    }

    pub fn auto_layout(&self) -> Result<(), AppError> {
        lock_store(&self.store)?.apply_hierarchical_layout(&HierarchyLayoutOptions::default());
        self.schedule_save()
    }

    pub fn export_layout(&self) -> Result<String, AppError> {
        let layout = self.snapshot()?;
        self.persistence.export_json(&layout)
    }

    /// Replace the canvas with an exported layout, keeping the current roster.
    pub fn import_layout(&self, raw: &str) -> Result<ReconcileReport, AppError> {
        let layout = self.persistence.import_json(raw)?;
        let report = {
            let mut store = lock_store(&self.store)?;
            let teams = store.team_ids().to_vec();
            store.replace_layout(&teams, layout, true);
            store.reconcile_teams(&teams)
        };
        self.schedule_save()?;
        Ok(report)
    }

    fn schedule_save(&self) -> Result<(), AppError> {
        if self.config.auto_save {
            self.debouncer.request_save()?;
        }
        Ok(())
    }
}
