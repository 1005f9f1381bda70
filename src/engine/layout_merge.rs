//! Layout reconciliation and normalized comparison.
//!
//! `merge_layouts` unions a local and a remote copy of the same layout.
//! `NormalizedLayout` strips everything that should not count as a change
//! (ids, timestamps, sub-unit jitter) so two layouts can be compared for
//! "unsaved changes" without false positives.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::db::models::{CanvasLayout, ConnectionKey, ConnectionType, LineStyle, TeamPosition};

// ============================================================================
// Merge
// ============================================================================

/// Union two copies of a layout.
///
/// - positions: by team id, the copy with the newer `updated_at` wins (tie → remote)
/// - connections: by (source, target, type), remote seeded first, local
///   entries only added when their key is absent
/// - view: from the layout whose overall `updated_at` is newer (tie → remote)
pub fn merge_layouts(local: &CanvasLayout, remote: &CanvasLayout) -> CanvasLayout {
    let local_by_team: HashMap<&str, &TeamPosition> = local
        .positions
        .iter()
        .map(|p| (p.team_id.as_str(), p))
        .collect();

    let mut positions = Vec::with_capacity(remote.positions.len().max(local.positions.len()));
    let mut seen: HashSet<&str> = HashSet::new();
    for remote_pos in &remote.positions {
        if !seen.insert(remote_pos.team_id.as_str()) {
            continue;
        }
        let chosen = match local_by_team.get(remote_pos.team_id.as_str()) {
            Some(local_pos) if local_pos.updated_at > remote_pos.updated_at => *local_pos,
            _ => remote_pos,
        };
        positions.push(chosen.clone());
    }
    for local_pos in &local.positions {
        if seen.insert(local_pos.team_id.as_str()) {
            positions.push(local_pos.clone());
        }
    }

    let mut connections = Vec::with_capacity(remote.connections.len() + local.connections.len());
    let mut keys: HashSet<ConnectionKey> = HashSet::new();
    for conn in remote.connections.iter().chain(local.connections.iter()) {
        if keys.insert(conn.key()) {
            connections.push(conn.clone());
        }
    }

    let local_newer = local.updated_at > remote.updated_at;
    let base = if local_newer { local } else { remote };

    CanvasLayout {
        user_id: remote.user_id.clone(),
        workspace_id: remote.workspace_id.clone().or_else(|| local.workspace_id.clone()),
        positions,
        connections,
        view: base.view,
        updated_at: local.updated_at.max(remote.updated_at),
    }
}

// ============================================================================
// Normalized comparison
// ============================================================================

/// Semantic content of a connection, without id or timestamps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedConnection {
    pub source_team_id: String,
    pub target_team_id: String,
    pub connection_type: ConnectionType,
    pub label: Option<String>,
    pub color: Option<String>,
    pub line_style: Option<LineStyle>,
}

/// A layout reduced to what the user can actually see change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLayout {
    /// team id → (x, y) rounded to whole units.
    pub positions: BTreeMap<String, (i64, i64)>,
    pub connections: BTreeSet<NormalizedConnection>,
    /// zoom × 100, rounded.
    pub zoom_centi: i64,
    pub pan: (i64, i64),
}

impl NormalizedLayout {
    pub fn from_layout(layout: &CanvasLayout) -> Self {
        let positions = layout
            .positions
            .iter()
            .map(|p| (p.team_id.clone(), (round_unit(p.x), round_unit(p.y))))
            .collect();
        let connections = layout
            .connections
            .iter()
            .map(|c| NormalizedConnection {
                source_team_id: c.source_team_id.clone(),
                target_team_id: c.target_team_id.clone(),
                connection_type: c.connection_type,
                label: c.label.clone(),
                color: c.color.clone(),
                line_style: c.line_style,
            })
            .collect();
        Self {
            positions,
            connections,
            zoom_centi: round_unit(layout.view.zoom * 100.0),
            pan: (round_unit(layout.view.center_x), round_unit(layout.view.center_y)),
        }
    }
}

/// Whether two layouts are equal once jitter and bookkeeping fields are ignored.
pub fn layouts_equivalent(a: &CanvasLayout, b: &CanvasLayout) -> bool {
    NormalizedLayout::from_layout(a) == NormalizedLayout::from_layout(b)
}

fn round_unit(v: f64) -> i64 {
    if v.is_finite() {
        v.round() as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{TeamConnection, ViewSettings};
    use chrono::{Duration, Utc};

    fn conn(id: &str, s: &str, t: &str, kind: ConnectionType) -> TeamConnection {
        let now = Utc::now();
        TeamConnection {
            id: id.into(),
            source_team_id: s.into(),
            target_team_id: t.into(),
            connection_type: kind,
            label: None,
            color: None,
            line_style: None,
            source_handle: None,
            target_handle: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn layout_at(offset_secs: i64) -> CanvasLayout {
        let at = Utc::now() + Duration::seconds(offset_secs);
        let mut l = CanvasLayout::empty("user-1", Some("ws".into()), at);
        l.positions = vec![
            TeamPosition::new("a", 50.0, 50.0, at),
            TeamPosition::new("b", 370.0, 50.0, at),
        ];
        l
    }

    #[test]
    fn newer_position_wins_per_team() {
        let mut local = layout_at(0);
        let mut remote = layout_at(0);
        local.positions[0].x = 999.0;
        local.positions[0].updated_at = remote.positions[0].updated_at + Duration::seconds(5);
        remote.positions[1].x = 111.0;
        remote.positions[1].updated_at = local.positions[1].updated_at + Duration::seconds(5);
        local.positions.push(TeamPosition::new("c", 1.0, 2.0, local.updated_at));

        let merged = merge_layouts(&local, &remote);
        assert_eq!(merged.position_of("a").unwrap().x, 999.0);
        assert_eq!(merged.position_of("b").unwrap().x, 111.0);
        assert_eq!(merged.position_of("c").unwrap().y, 2.0);
        assert_eq!(merged.positions.len(), 3);
    }

    #[test]
    fn connections_union_remote_first() {
        let mut local = layout_at(0);
        let mut remote = layout_at(0);
        let mut labelled = conn("local-1", "a", "b", ConnectionType::Supports);
        labelled.label = Some("local label".into());
        local.connections = vec![labelled, conn("local-2", "b", "a", ConnectionType::Custom)];
        remote.connections = vec![conn("remote-1", "a", "b", ConnectionType::Supports)];

        let merged = merge_layouts(&local, &remote);
        assert_eq!(merged.connections.len(), 2);
        assert_eq!(merged.connections[0].id, "remote-1");
        assert!(merged.connections[0].label.is_none());
        assert_eq!(merged.connections[1].id, "local-2");
    }

    #[test]
    fn view_from_newer_layout() {
        let mut local = layout_at(10);
        let mut remote = layout_at(0);
        local.view = ViewSettings { zoom: 2.0, center_x: 5.0, center_y: 5.0 };
        remote.view = ViewSettings { zoom: 0.5, center_x: 0.0, center_y: 0.0 };
        assert_eq!(merge_layouts(&local, &remote).view.zoom, 2.0);

        local.updated_at = remote.updated_at;
        let merged = merge_layouts(&local, &remote);
        assert_eq!(merged.view.zoom, 0.5);
        assert_eq!(merged.updated_at, remote.updated_at);
    }

    #[test]
    fn merge_with_self_is_identity() {
        let mut l = layout_at(0);
        l.connections = vec![conn("c1", "a", "b", ConnectionType::ReportsTo)];
        let merged = merge_layouts(&l, &l);
        assert!(layouts_equivalent(&merged, &l));
        assert_eq!(merged, l);
    }

    #[test]
    fn normalization_ignores_jitter_and_ids() {
        let base = layout_at(0);
        let mut jitter = base.clone();
        jitter.positions[0].x += 0.3;
        jitter.view.zoom += 0.001;
        jitter.updated_at = jitter.updated_at + Duration::hours(1);
        assert!(layouts_equivalent(&base, &jitter));

        let mut moved = base.clone();
        moved.positions[0].x += 1.0;
        assert!(!layouts_equivalent(&base, &moved));

        let mut a = base.clone();
        let mut b = base.clone();
        a.connections = vec![conn("x", "a", "b", ConnectionType::Supports)];
        b.connections = vec![conn("y", "a", "b", ConnectionType::Supports)];
        assert!(layouts_equivalent(&a, &b));
    }
}
