//! Pure layout geometry for the team canvas.
//!
//! Grid placement, hierarchical auto-layout from `reports_to` edges, bounds,
//! fit-to-viewport, position validation and grid snapping. Nothing here
//! touches state or I/O.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::models::{ConnectionType, TeamConnection, TeamPosition, ViewSettings};
use crate::validation::MAX_COORDINATE;

pub const GRID_COLUMNS: usize = 3;
pub const GRID_COLUMN_WIDTH: f64 = 320.0;
pub const GRID_ROW_HEIGHT: f64 = 200.0;
pub const GRID_ORIGIN: f64 = 50.0;

pub const DEFAULT_NODE_WIDTH: f64 = 280.0;
pub const DEFAULT_NODE_HEIGHT: f64 = 120.0;
pub const DEFAULT_BOUNDS_MARGIN: f64 = 50.0;
pub const DEFAULT_GRID_SIZE: f64 = 20.0;

// ============================================================================
// Grid placement
// ============================================================================

/// Canvas coordinates of the `index`-th team in the default 3-column grid.
pub fn grid_position(index: usize) -> (f64, f64) {
    let col = (index % GRID_COLUMNS) as f64;
    let row = (index / GRID_COLUMNS) as f64;
    (col * GRID_COLUMN_WIDTH + GRID_ORIGIN, row * GRID_ROW_HEIGHT + GRID_ORIGIN)
}

/// Default grid layout for every team, in roster order.
pub fn default_layout(team_ids: &[String], now: DateTime<Utc>) -> Vec<TeamPosition> {
    team_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let (x, y) = grid_position(i);
            TeamPosition::new(id.clone(), x, y, now)
        })
        .collect()
}

/// Place `new_team_ids` in grid columns on the first free row below `existing`.
///
/// With no existing positions this is identical to [`default_layout`].
pub fn next_free_row_positions(
    existing: &[TeamPosition],
    new_team_ids: &[String],
    now: DateTime<Utc>,
) -> Vec<TeamPosition> {
    let start_y = existing
        .iter()
        .map(|p| p.y)
        .fold(None, |acc: Option<f64>, y| Some(acc.map_or(y, |a| a.max(y))))
        .map(|max_y| max_y + GRID_ROW_HEIGHT)
        .unwrap_or(GRID_ORIGIN);

    new_team_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let (x, y) = grid_position(i);
            TeamPosition::new(id.clone(), x, start_y + (y - GRID_ORIGIN), now)
        })
        .collect()
}

// ============================================================================
// Hierarchical layout
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyLayoutOptions {
    pub node_width: f64,
    pub node_height: f64,
    pub horizontal_spacing: f64,
    pub vertical_spacing: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl Default for HierarchyLayoutOptions {
    fn default() -> Self {
        Self {
            node_width: DEFAULT_NODE_WIDTH,
            node_height: DEFAULT_NODE_HEIGHT,
            horizontal_spacing: 40.0,
            vertical_spacing: 80.0,
            origin_x: GRID_ORIGIN,
            origin_y: GRID_ORIGIN,
        }
    }
}

/// Tree layout driven by `reports_to` edges (source = parent, target = child).
///
/// Each subtree is as wide as `max(node_width, children + gaps)` and every
/// parent is centred over its children. Teams without a parent are roots,
/// laid out left to right. A team with several parents is placed under the
/// first one encountered.
pub fn hierarchical_layout(
    team_ids: &[String],
    connections: &[TeamConnection],
    opts: &HierarchyLayoutOptions,
    now: DateTime<Utc>,
) -> Vec<TeamPosition> {
    if team_ids.is_empty() {
        return Vec::new();
    }

    let known: HashSet<&str> = team_ids.iter().map(String::as_str).collect();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut has_parent: HashSet<&str> = HashSet::new();
    for c in connections {
        if c.connection_type != ConnectionType::ReportsTo {
            continue;
        }
        let (parent, child) = (c.source_team_id.as_str(), c.target_team_id.as_str());
        if !known.contains(parent) || !known.contains(child) || parent == child {
            continue;
        }
        children.entry(parent).or_default().push(child);
        has_parent.insert(child);
    }

    let mut roots: Vec<&str> = team_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !has_parent.contains(id))
        .collect();
    if roots.is_empty() {
        roots.push(team_ids[0].as_str());
    }

    // Claim each node for exactly one parent so shared children and cycles
    // cannot be visited twice.
    let mut tree: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut ordered_roots: Vec<&str> = Vec::new();
    let mut pending_roots = roots;
    let mut next_unplaced = 0;
    loop {
        for root in pending_roots.drain(..) {
            if claimed.insert(root) {
                ordered_roots.push(root);
                claim_subtree(root, &children, &mut claimed, &mut tree);
            }
        }
        // Anything left is only reachable through a cycle; promote it to a root.
        while next_unplaced < team_ids.len() && claimed.contains(team_ids[next_unplaced].as_str()) {
            next_unplaced += 1;
        }
        if next_unplaced >= team_ids.len() {
            break;
        }
        pending_roots.push(team_ids[next_unplaced].as_str());
    }

    let mut widths: HashMap<&str, f64> = HashMap::new();
    for root in &ordered_roots {
        subtree_width(*root, &tree, opts, &mut widths);
    }

    let mut placed: HashMap<&str, (f64, f64)> = HashMap::new();
    let mut cursor_x = opts.origin_x;
    for root in &ordered_roots {
        place_subtree(*root, cursor_x, opts.origin_y, &tree, &widths, opts, &mut placed);
        cursor_x += widths.get(root).copied().unwrap_or(opts.node_width) + opts.horizontal_spacing;
    }

    team_ids
        .iter()
        .map(|id| {
            let (x, y) = placed
                .get(id.as_str())
                .copied()
                .unwrap_or((opts.origin_x, opts.origin_y));
            TeamPosition::new(id.clone(), x, y, now)
        })
        .collect()
}

fn claim_subtree<'a>(
    node: &'a str,
    children: &HashMap<&'a str, Vec<&'a str>>,
    claimed: &mut HashSet<&'a str>,
    tree: &mut HashMap<&'a str, Vec<&'a str>>,
) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let Some(kids) = children.get(current) else {
            continue;
        };
        let mut owned = Vec::new();
        for &kid in kids {
            if claimed.insert(kid) {
                owned.push(kid);
            }
        }
        // Push in reverse so the first child is processed first.
        for &kid in owned.iter().rev() {
            stack.push(kid);
        }
        tree.insert(current, owned);
    }
}

fn subtree_width<'a>(
    node: &'a str,
    tree: &HashMap<&'a str, Vec<&'a str>>,
    opts: &HierarchyLayoutOptions,
    widths: &mut HashMap<&'a str, f64>,
) -> f64 {
    if let Some(w) = widths.get(node) {
        return *w;
    }
    let kids = tree.get(node).map(Vec::as_slice).unwrap_or(&[]);
    let width = if kids.is_empty() {
        opts.node_width
    } else {
        let sum: f64 = kids.iter().map(|k| subtree_width(*k, tree, opts, widths)).sum();
        let gaps = opts.horizontal_spacing * (kids.len() - 1) as f64;
        opts.node_width.max(sum + gaps)
    };
    widths.insert(node, width);
    width
}

fn place_subtree<'a>(
    node: &'a str,
    left: f64,
    top: f64,
    tree: &HashMap<&'a str, Vec<&'a str>>,
    widths: &HashMap<&'a str, f64>,
    opts: &HierarchyLayoutOptions,
    placed: &mut HashMap<&'a str, (f64, f64)>,
) {
    let width = widths.get(node).copied().unwrap_or(opts.node_width);
    placed.insert(node, (left + (width - opts.node_width) / 2.0, top));

    let kids = tree.get(node).map(Vec::as_slice).unwrap_or(&[]);
    if kids.is_empty() {
        return;
    }
    let span: f64 = kids
        .iter()
        .map(|k| widths.get(k).copied().unwrap_or(opts.node_width))
        .sum::<f64>()
        + opts.horizontal_spacing * (kids.len() - 1) as f64;
    let mut child_left = left + (width - span) / 2.0;
    let child_top = top + opts.node_height + opts.vertical_spacing;
    for kid in kids {
        place_subtree(*kid, child_left, child_top, tree, widths, opts, placed);
        child_left += widths.get(kid).copied().unwrap_or(opts.node_width) + opts.horizontal_spacing;
    }
}

// ============================================================================
// Bounds + viewport
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LayoutBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl LayoutBounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }
}

/// Bounding box over all nodes (each extended by its size), grown by `margin`.
pub fn calculate_bounds(positions: &[TeamPosition], margin: f64) -> Option<LayoutBounds> {
    let first = positions.first()?;
    let mut bounds = LayoutBounds {
        min_x: first.x,
        min_y: first.y,
        max_x: first.x,
        max_y: first.y,
    };
    for p in positions {
        let w = p.width.unwrap_or(DEFAULT_NODE_WIDTH);
        let h = p.height.unwrap_or(DEFAULT_NODE_HEIGHT);
        bounds.min_x = bounds.min_x.min(p.x);
        bounds.min_y = bounds.min_y.min(p.y);
        bounds.max_x = bounds.max_x.max(p.x + w);
        bounds.max_y = bounds.max_y.max(p.y + h);
    }
    bounds.min_x -= margin;
    bounds.min_y -= margin;
    bounds.max_x += margin;
    bounds.max_y += margin;
    Some(bounds)
}

/// Zoom + pan that fits `bounds` inside the container. Never zooms past 100%.
///
/// The pan offset is the translation applied after scaling so that the
/// bounds' centre lands on the container's centre.
pub fn calculate_fit_viewport(
    bounds: &LayoutBounds,
    container_width: f64,
    container_height: f64,
) -> ViewSettings {
    let width_ratio = if bounds.width() > 0.0 {
        container_width / bounds.width()
    } else {
        1.0
    };
    let height_ratio = if bounds.height() > 0.0 {
        container_height / bounds.height()
    } else {
        1.0
    };
    let zoom = width_ratio.min(height_ratio).min(1.0);
    let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };

    let (cx, cy) = bounds.center();
    ViewSettings {
        zoom,
        center_x: container_width / 2.0 - cx * zoom,
        center_y: container_height / 2.0 - cy * zoom,
    }
}

/// Non-finite zooms fall back to 1.0. An inverted range resolves to `max`.
pub fn clamp_zoom(zoom: f64, min: f64, max: f64) -> f64 {
    let zoom = if zoom.is_finite() { zoom } else { 1.0 };
    zoom.max(min).min(max)
}

// ============================================================================
// Validation + snapping
// ============================================================================

/// Both coordinates finite and within ±10,000 units.
pub fn is_valid_position(x: f64, y: f64) -> bool {
    x.is_finite() && y.is_finite() && x.abs() <= MAX_COORDINATE && y.abs() <= MAX_COORDINATE
}

/// Round each coordinate to the nearest multiple of `grid_size`.
pub fn snap_to_grid(x: f64, y: f64, grid_size: f64) -> (f64, f64) {
    if !(grid_size.is_finite() && grid_size > 0.0) {
        return (x, y);
    }
    (
        (x / grid_size).round() * grid_size,
        (y / grid_size).round() * grid_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn reports_to(source: &str, target: &str) -> TeamConnection {
        let now = Utc::now();
        TeamConnection {
            id: format!("{source}->{target}"),
            source_team_id: source.into(),
            target_team_id: target.into(),
            connection_type: ConnectionType::ReportsTo,
            label: None,
            color: None,
            line_style: None,
            source_handle: None,
            target_handle: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn xy(positions: &[TeamPosition], id: &str) -> (f64, f64) {
        let p = positions.iter().find(|p| p.team_id == id).unwrap();
        (p.x, p.y)
    }

    #[test]
    fn grid_positions() {
        assert_eq!(grid_position(0), (50.0, 50.0));
        assert_eq!(grid_position(1), (370.0, 50.0));
        assert_eq!(grid_position(2), (690.0, 50.0));
        assert_eq!(grid_position(3), (50.0, 250.0));
        assert_eq!(grid_position(7), (370.0, 450.0));
    }

    #[test]
    fn default_layout_follows_roster_order() {
        let layout = default_layout(&ids(&["a", "b", "c", "d"]), Utc::now());
        assert_eq!(xy(&layout, "a"), (50.0, 50.0));
        assert_eq!(xy(&layout, "c"), (690.0, 50.0));
        assert_eq!(xy(&layout, "d"), (50.0, 250.0));
    }

    #[test]
    fn next_free_row_goes_below_existing() {
        let now = Utc::now();
        let existing = vec![
            TeamPosition::new("a", 50.0, 50.0, now),
            TeamPosition::new("b", 400.0, 330.0, now),
        ];
        let added = next_free_row_positions(&existing, &ids(&["x", "y", "z", "w"]), now);
        assert_eq!(xy(&added, "x"), (50.0, 530.0));
        assert_eq!(xy(&added, "y"), (370.0, 530.0));
        assert_eq!(xy(&added, "w"), (50.0, 730.0));

        let fresh = next_free_row_positions(&[], &ids(&["x"]), now);
        assert_eq!(xy(&fresh, "x"), (50.0, 50.0));
    }

    #[test]
    fn hierarchy_centres_parent_over_children() {
        let opts = HierarchyLayoutOptions::default();
        let edges = vec![reports_to("a", "b"), reports_to("a", "c")];
        let layout = hierarchical_layout(&ids(&["a", "b", "c"]), &edges, &opts, Utc::now());

        let (ax, ay) = xy(&layout, "a");
        let (bx, by) = xy(&layout, "b");
        let (cx, cy) = xy(&layout, "c");
        // Subtree width = 280 + 40 + 280 = 600, parent centred: 50 + (600 - 280) / 2.
        assert_eq!((ax, ay), (210.0, 50.0));
        assert_eq!((bx, by), (50.0, 250.0));
        assert_eq!((cx, cy), (370.0, 250.0));
        assert_eq!(by, cy);
    }

    #[test]
    fn hierarchy_multiple_roots_side_by_side() {
        let opts = HierarchyLayoutOptions::default();
        let layout = hierarchical_layout(&ids(&["a", "b"]), &[], &opts, Utc::now());
        assert_eq!(xy(&layout, "a"), (50.0, 50.0));
        assert_eq!(xy(&layout, "b"), (370.0, 50.0));
    }

    #[test]
    fn hierarchy_survives_cycles_in_stored_data() {
        let opts = HierarchyLayoutOptions::default();
        let edges = vec![reports_to("a", "b"), reports_to("b", "a")];
        let layout = hierarchical_layout(&ids(&["a", "b"]), &edges, &opts, Utc::now());
        assert_eq!(layout.len(), 2);
        // "a" becomes the synthetic root, "b" sits below it.
        assert_eq!(xy(&layout, "a"), (50.0, 50.0));
        assert_eq!(xy(&layout, "b"), (50.0, 250.0));
    }

    #[test]
    fn hierarchy_ignores_non_hierarchical_edges() {
        let opts = HierarchyLayoutOptions::default();
        let mut edge = reports_to("a", "b");
        edge.connection_type = ConnectionType::Supports;
        let layout = hierarchical_layout(&ids(&["a", "b"]), &[edge], &opts, Utc::now());
        assert_eq!(xy(&layout, "b").1, 50.0);
    }

    #[test]
    fn bounds_include_node_size_and_margin() {
        let now = Utc::now();
        let mut wide = TeamPosition::new("b", 400.0, 100.0, now);
        wide.width = Some(400.0);
        let positions = vec![TeamPosition::new("a", 0.0, 0.0, now), wide];
        let b = calculate_bounds(&positions, 50.0).unwrap();
        assert_eq!(b.min_x, -50.0);
        assert_eq!(b.min_y, -50.0);
        assert_eq!(b.max_x, 850.0);
        assert_eq!(b.max_y, 270.0);
        assert!(calculate_bounds(&[], 50.0).is_none());
    }

    #[test]
    fn fit_viewport_never_upscales() {
        let small = LayoutBounds { min_x: 0.0, min_y: 0.0, max_x: 100.0, max_y: 100.0 };
        let view = calculate_fit_viewport(&small, 1000.0, 800.0);
        assert_eq!(view.zoom, 1.0);
        assert_eq!(view.center_x, 450.0);
        assert_eq!(view.center_y, 350.0);
    }

    #[test]
    fn fit_viewport_shrinks_large_layouts() {
        let large = LayoutBounds { min_x: 0.0, min_y: 0.0, max_x: 2000.0, max_y: 1000.0 };
        let view = calculate_fit_viewport(&large, 1000.0, 800.0);
        assert_eq!(view.zoom, 0.5);
        assert_eq!(view.center_x, 0.0);
        assert_eq!(view.center_y, 150.0);
    }

    #[test]
    fn validity_and_snapping() {
        assert!(is_valid_position(0.0, -10_000.0));
        assert!(!is_valid_position(10_001.0, 0.0));
        assert!(!is_valid_position(f64::NAN, 0.0));
        assert_eq!(snap_to_grid(29.0, 31.0, 20.0), (20.0, 40.0));
        assert_eq!(snap_to_grid(-9.0, 0.0, 20.0), (-0.0, 0.0));
        assert_eq!(snap_to_grid(13.0, 7.0, 0.0), (13.0, 7.0));
        assert_eq!(clamp_zoom(10.0, 0.1, 4.0), 4.0);
        assert_eq!(clamp_zoom(f64::NAN, 0.1, 4.0), 1.0);
    }

    #[test]
    fn inverted_zoom_range_does_not_panic() {
        assert_eq!(clamp_zoom(1.0, 4.0, 0.5), 0.5);
        assert_eq!(clamp_zoom(f64::INFINITY, 4.0, 0.5), 0.5);
    }
}
