//! Canvas state store.
//!
//! The single owner of runtime canvas state. Every mutation goes through a
//! method here so the dirty flag, the revision counter and change
//! notifications stay consistent. Structural edge rules are delegated to
//! [`ConnectionGraph`].

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use ts_rs::TS;

use crate::config::CanvasConfig;
use crate::db::models::{
    CanvasLayout, ConnectionPatch, DisplayOptions, NewConnection, TeamConnection, TeamPosition,
    ViewSettings,
};
use crate::engine::connection_graph::{BatchResult, ConnectionGraph, ConnectionRejection, HierarchyNode};
use crate::engine::geometry::{self, HierarchyLayoutOptions, LayoutBounds};
use crate::error::AppError;
use crate::validation;

/// What [`CanvasStore::reconcile_teams`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub added_teams: Vec<String>,
    pub removed_teams: Vec<String>,
    pub removed_connections: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added_teams.is_empty() && self.removed_teams.is_empty() && self.removed_connections == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CanvasStats {
    pub team_count: usize,
    pub positioned_count: usize,
    pub connection_count: usize,
    /// Keyed by connection type wire name.
    pub connections_by_type: BTreeMap<String, usize>,
    pub dirty: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
}

pub struct CanvasStore {
    config: CanvasConfig,
    user_id: String,
    workspace_id: Option<String>,
    positions: Vec<TeamPosition>,
    graph: ConnectionGraph,
    view: ViewSettings,
    display: DisplayOptions,
    selected_teams: BTreeSet<String>,
    selected_connections: BTreeSet<String>,
    dirty: bool,
    revision: u64,
    updated_at: DateTime<Utc>,
    last_saved_at: Option<DateTime<Utc>>,
    changes: watch::Sender<u64>,
}

impl CanvasStore {
    /// Build the store from an optional prior layout.
    ///
    /// Without one, every team gets a default grid position and there are
    /// no edges. With one, its positions, edges and view are used as-is,
    /// except edges that reference teams outside `team_ids`, which are
    /// dropped with a warning. Missing positions are *not* filled in here;
    /// call [`reconcile_teams`](Self::reconcile_teams) once loading is done.
    pub fn new(
        config: CanvasConfig,
        user_id: impl Into<String>,
        workspace_id: Option<String>,
        team_ids: &[String],
        initial: Option<CanvasLayout>,
    ) -> Self {
        let now = Utc::now();
        let (changes, _) = watch::channel(0);
        let display = DisplayOptions {
            snap_to_grid: config.snap_to_grid,
            ..DisplayOptions::default()
        };
        let max = config.max_connections_per_team;

        let mut store = Self {
            config,
            user_id: user_id.into(),
            workspace_id,
            positions: Vec::new(),
            graph: ConnectionGraph::new(team_ids, max),
            view: ViewSettings::default(),
            display,
            selected_teams: BTreeSet::new(),
            selected_connections: BTreeSet::new(),
            dirty: false,
            revision: 0,
            updated_at: now,
            last_saved_at: None,
            changes,
        };

        match initial {
            Some(layout) => store.install_layout(layout),
            None => {
                store.positions = geometry::default_layout(team_ids, now);
                tracing::debug!(teams = team_ids.len(), "Canvas initialized with default grid");
            }
        }
        store
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn positions(&self) -> &[TeamPosition] {
        &self.positions
    }

    pub fn position_of(&self, team_id: &str) -> Option<&TeamPosition> {
        self.positions.iter().find(|p| p.team_id == team_id)
    }

    pub fn connections(&self) -> &[TeamConnection] {
        self.graph.edges()
    }

    pub fn graph(&self) -> &ConnectionGraph {
        &self.graph
    }

    pub fn view(&self) -> ViewSettings {
        self.view
    }

    pub fn display(&self) -> DisplayOptions {
        self.display
    }

    pub fn selected_teams(&self) -> &BTreeSet<String> {
        &self.selected_teams
    }

    pub fn selected_connections(&self) -> &BTreeSet<String> {
        &self.selected_connections
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn team_ids(&self) -> &[String] {
        self.graph.teams()
    }

    /// Receives the new revision after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Snapshot of the persisted aggregate.
    pub fn layout(&self) -> CanvasLayout {
        CanvasLayout {
            user_id: self.user_id.clone(),
            workspace_id: self.workspace_id.clone(),
            positions: self.positions.clone(),
            connections: self.graph.edges().to_vec(),
            view: self.view,
            updated_at: self.updated_at,
        }
    }

    pub fn hierarchy(&self, root: Option<&str>) -> Vec<HierarchyNode> {
        self.graph.hierarchy(root)
    }

    pub fn bounds(&self) -> Option<LayoutBounds> {
        geometry::calculate_bounds(&self.positions, self.config.bounds_margin)
    }

    pub fn stats(&self) -> CanvasStats {
        let mut connections_by_type = BTreeMap::new();
        for edge in self.graph.edges() {
            *connections_by_type
                .entry(edge.connection_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        CanvasStats {
            team_count: self.graph.teams().len(),
            positioned_count: self.positions.len(),
            connection_count: self.graph.edges().len(),
            connections_by_type,
            dirty: self.dirty,
            last_saved_at: self.last_saved_at,
        }
    }

    // ------------------------------------------------------------------------
    // Viewport
    // ------------------------------------------------------------------------

    pub fn set_viewport(&mut self, view: ViewSettings) -> ViewSettings {
        self.view = ViewSettings {
            zoom: geometry::clamp_zoom(view.zoom, self.config.min_zoom, self.config.max_zoom),
            center_x: if view.center_x.is_finite() { view.center_x } else { 0.0 },
            center_y: if view.center_y.is_finite() { view.center_y } else { 0.0 },
        };
        self.touch();
        self.view
    }

    /// Multiply the zoom by `1 ± zoom_step` per step, clamped to the configured range.
    pub fn zoom_by(&mut self, steps: i32) -> ViewSettings {
        let factor = (1.0 + self.config.zoom_step).powi(steps);
        let view = ViewSettings {
            zoom: self.view.zoom * factor,
            ..self.view
        };
        self.set_viewport(view)
    }

    /// Fit all nodes into a container of the given size. No-op on an empty canvas.
    pub fn fit_to_viewport(&mut self, container_width: f64, container_height: f64) -> Option<ViewSettings> {
        let bounds = self.bounds()?;
        let view = geometry::calculate_fit_viewport(&bounds, container_width, container_height);
        Some(self.set_viewport(view))
    }

    pub fn set_display(&mut self, display: DisplayOptions) {
        self.display = display;
        self.touch();
    }

    // ------------------------------------------------------------------------
    // Positions
    // ------------------------------------------------------------------------

    /// Insert or move a team node. Snaps to the grid when snap-to-grid is on.
    pub fn upsert_position(&mut self, team_id: &str, x: f64, y: f64) -> Result<TeamPosition, AppError> {
        validation::require_valid_id("team_id", team_id)?;
        validation::require_coordinate("x", x)?;
        validation::require_coordinate("y", y)?;

        let (x, y) = if self.display.snap_to_grid {
            geometry::snap_to_grid(x, y, self.config.grid_size)
        } else {
            (x, y)
        };

        let now = Utc::now();
        let position = match self.positions.iter_mut().find(|p| p.team_id == team_id) {
            Some(existing) => {
                existing.x = x;
                existing.y = y;
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let created = TeamPosition::new(team_id, x, y, now);
                self.positions.push(created.clone());
                created
            }
        };
        self.touch_at(now);
        Ok(position)
    }

    pub fn resize(&mut self, team_id: &str, width: Option<f64>, height: Option<f64>) -> Result<TeamPosition, AppError> {
        validation::require_dimension("width", width)?;
        validation::require_dimension("height", height)?;
        let now = Utc::now();
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.team_id == team_id)
            .ok_or_else(|| AppError::NotFound(format!("Position for team {team_id}")))?;
        position.width = width;
        position.height = height;
        position.updated_at = now;
        let position = position.clone();
        self.touch_at(now);
        Ok(position)
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    pub fn add_connection(&mut self, request: NewConnection) -> Result<TeamConnection, ConnectionRejection> {
        let edge = self.graph.add(request)?;
        self.touch();
        Ok(edge)
    }

    pub fn add_connections(&mut self, requests: Vec<NewConnection>) -> BatchResult {
        let result = self.graph.add_many(requests);
        if !result.created.is_empty() {
            self.touch();
        }
        result
    }

    pub fn remove_connection(&mut self, edge_id: &str) -> bool {
        let removed = self.graph.remove(edge_id);
        if removed {
            self.selected_connections.remove(edge_id);
            self.touch();
        }
        removed
    }

    pub fn update_connection(
        &mut self,
        edge_id: &str,
        patch: ConnectionPatch,
    ) -> Result<Option<TeamConnection>, ConnectionRejection> {
        let updated = self.graph.update(edge_id, patch)?;
        if updated.is_some() {
            self.touch();
        }
        Ok(updated)
    }

    /// Remove every selected connection. Returns how many were removed.
    pub fn remove_selected_connections(&mut self) -> usize {
        let selected: Vec<String> = self.selected_connections.iter().cloned().collect();
        let removed = selected.iter().filter(|id| self.graph.remove(id)).count();
        self.selected_connections.clear();
        if removed > 0 {
            self.touch();
        }
        removed
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Replace both selection sets. Unknown ids are ignored.
    pub fn set_selection(&mut self, teams: impl IntoIterator<Item = String>, connections: impl IntoIterator<Item = String>) {
        self.selected_teams = teams.into_iter().filter(|t| self.graph.is_known(t)).collect();
        self.selected_connections = connections
            .into_iter()
            .filter(|c| self.graph.get(c).is_some())
            .collect();
        self.touch();
    }

    pub fn clear_selection(&mut self) {
        if self.selected_teams.is_empty() && self.selected_connections.is_empty() {
            return;
        }
        self.selected_teams.clear();
        self.selected_connections.clear();
        self.touch();
    }

    // ------------------------------------------------------------------------
    // Whole-layout operations
    // ------------------------------------------------------------------------

    /// Throw away positions, edges, selection and view; regenerate the default grid.
    pub fn reset_layout(&mut self) {
        let now = Utc::now();
        let teams = self.graph.teams().to_vec();
        self.positions = geometry::default_layout(&teams, now);
        self.graph = ConnectionGraph::new(&teams, self.config.max_connections_per_team);
        self.view = ViewSettings::default();
        self.selected_teams.clear();
        self.selected_connections.clear();
        tracing::info!(teams = teams.len(), "Canvas layout reset to default grid");
        self.touch_at(now);
    }

    /// Reposition every team as a `reports_to` tree. Edges are untouched.
    pub fn apply_hierarchical_layout(&mut self, opts: &HierarchyLayoutOptions) {
        let now = Utc::now();
        let teams = self.graph.teams().to_vec();
        let mut laid_out = geometry::hierarchical_layout(&teams, self.graph.edges(), opts, now);
        // Keep sizes and creation stamps the user already had.
        for p in &mut laid_out {
            if let Some(old) = self.positions.iter().find(|o| o.team_id == p.team_id) {
                p.width = old.width;
                p.height = old.height;
                p.created_at = old.created_at;
            }
        }
        self.positions = laid_out;
        self.touch_at(now);
    }

    /// Swap in a freshly loaded layout for the given roster. Edges touching
    /// teams outside `team_ids` are dropped. Counts as unsaved only if `mark_dirty`.
    pub fn replace_layout(&mut self, team_ids: &[String], layout: CanvasLayout, mark_dirty: bool) {
        self.graph.set_known_teams(team_ids);
        self.install_layout(layout);
        self.selected_teams.clear();
        self.selected_connections.clear();
        self.revision += 1;
        self.dirty = mark_dirty;
        self.changes.send_replace(self.revision);
    }

    /// Bring positions and edges in line with the current team roster.
    ///
    /// New teams are placed on the next free row; positions and edges of
    /// teams that disappeared are dropped. Idempotent: a second call with
    /// the same roster changes nothing and does not mark the store dirty.
    pub fn reconcile_teams(&mut self, known_teams: &[String]) -> ReconcileReport {
        let known: HashSet<&str> = known_teams.iter().map(String::as_str).collect();
        let mut report = ReconcileReport::default();

        self.positions.retain(|p| {
            let keep = known.contains(p.team_id.as_str());
            if !keep {
                report.removed_teams.push(p.team_id.clone());
            }
            keep
        });

        self.graph.set_known_teams(known_teams);
        let dropped = self.graph.retain_known();
        report.removed_connections = dropped.len();
        for edge in &dropped {
            tracing::warn!(
                id = %edge.id,
                source = %edge.source_team_id,
                target = %edge.target_team_id,
                "Dropping connection to a team that no longer exists"
            );
        }

        let positioned: HashSet<&str> = self.positions.iter().map(|p| p.team_id.as_str()).collect();
        let missing: Vec<String> = known_teams
            .iter()
            .filter(|t| !positioned.contains(t.as_str()))
            .cloned()
            .collect();
        let now = Utc::now();
        let placed = geometry::next_free_row_positions(&self.positions, &missing, now);
        self.positions.extend(placed);
        report.added_teams = missing;

        self.selected_teams.retain(|t| known.contains(t.as_str()));
        let graph = &self.graph;
        self.selected_connections.retain(|c| graph.get(c).is_some());

        if !report.is_noop() {
            tracing::info!(
                added = report.added_teams.len(),
                removed = report.removed_teams.len(),
                dropped_connections = report.removed_connections,
                "Canvas reconciled with team roster"
            );
            self.touch_at(now);
        }
        report
    }

    // ------------------------------------------------------------------------
    // Save bookkeeping
    // ------------------------------------------------------------------------

    /// Record a successful save of the snapshot taken at `revision`.
    ///
    /// The dirty flag is only cleared when nothing changed after that
    /// snapshot; otherwise the newer state still needs saving.
    pub fn mark_saved(&mut self, revision: u64, saved_at: DateTime<Utc>) {
        self.last_saved_at = Some(saved_at);
        if revision == self.revision {
            self.dirty = false;
            self.updated_at = saved_at;
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn install_layout(&mut self, layout: CanvasLayout) {
        let teams = self.graph.teams().to_vec();
        let max = self.config.max_connections_per_team;
        let (graph, dropped) = ConnectionGraph::from_edges(&teams, layout.connections, max);
        for edge in &dropped {
            tracing::warn!(
                id = %edge.id,
                source = %edge.source_team_id,
                target = %edge.target_team_id,
                "Ignoring stored connection that references an unknown team"
            );
        }
        self.graph = graph;
        self.positions = layout
            .positions
            .into_iter()
            .filter(|p| {
                let ok = geometry::is_valid_position(p.x, p.y);
                if !ok {
                    tracing::warn!(team_id = %p.team_id, x = p.x, y = p.y, "Ignoring out-of-range stored position");
                }
                ok
            })
            .collect();
        self.view = ViewSettings {
            zoom: geometry::clamp_zoom(layout.view.zoom, self.config.min_zoom, self.config.max_zoom),
            ..layout.view
        };
        self.updated_at = layout.updated_at;
    }

    fn touch(&mut self) {
        self.touch_at(Utc::now());
    }

    fn touch_at(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        self.dirty = true;
        self.updated_at = now;
        self.changes.send_replace(self.revision);
    }
}
