//! Connection graph manager.
//!
//! Owns the typed edges between team nodes and enforces the structural
//! invariants before anything is admitted: no self references, no duplicate
//! (source, target, type), a per-team fan-out limit, and an acyclic
//! `reports_to` hierarchy.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::models::{ConnectionPatch, ConnectionType, NewConnection, TeamConnection};

pub const DEFAULT_MAX_CONNECTIONS_PER_TEAM: usize = 10;

// ============================================================================
// Rejections
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Source equals target, or an endpoint is not a known team.
    SelfReference,
    Duplicate,
    MaxConnections,
    /// The new `reports_to` edge would close a loop in the hierarchy.
    Cycle,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfReference => "self_reference",
            Self::Duplicate => "duplicate",
            Self::MaxConnections => "max_connections",
            Self::Cycle => "cycle",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured, non-fatal refusal to admit an edge. State is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRejection {
    pub reason: RejectionReason,
    pub message: String,
    pub source_team_id: String,
    pub target_team_id: String,
    pub connection_type: ConnectionType,
}

impl fmt::Display for ConnectionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.reason)
    }
}

/// Outcome of [`ConnectionGraph::add_many`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub created: Vec<TeamConnection>,
    /// Index into the request list paired with the reason it was refused.
    pub rejected: Vec<(usize, ConnectionRejection)>,
}

/// One node of the `reports_to` forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub team_id: String,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn leaf(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            children: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        1 + self.children.iter().map(HierarchyNode::size).sum::<usize>()
    }
}

// ============================================================================
// ConnectionGraph
// ============================================================================

/// Edge list plus incrementally maintained adjacency.
#[derive(Debug, Clone)]
pub struct ConnectionGraph {
    teams: Vec<String>,
    known: HashSet<String>,
    edges: Vec<TeamConnection>,
    /// source → targets, over every connection type.
    adjacency: HashMap<String, HashSet<String>>,
    /// parent → children, `reports_to` only. Drives the cycle search.
    reports_to: HashMap<String, HashSet<String>>,
    max_connections_per_team: usize,
}

impl ConnectionGraph {
    pub fn new(team_ids: &[String], max_connections_per_team: usize) -> Self {
        let mut graph = Self {
            teams: Vec::new(),
            known: HashSet::new(),
            edges: Vec::new(),
            adjacency: HashMap::new(),
            reports_to: HashMap::new(),
            max_connections_per_team,
        };
        graph.set_known_teams(team_ids);
        graph
    }

    /// Build from stored edges without re-validating them.
    ///
    /// Edges whose endpoints are unknown are returned in the second element
    /// so the caller can log them.
    pub fn from_edges(
        team_ids: &[String],
        edges: Vec<TeamConnection>,
        max_connections_per_team: usize,
    ) -> (Self, Vec<TeamConnection>) {
        let mut graph = Self::new(team_ids, max_connections_per_team);
        let mut dropped = Vec::new();
        for edge in edges {
            if graph.known.contains(&edge.source_team_id) && graph.known.contains(&edge.target_team_id) {
                graph.link(&edge);
                graph.edges.push(edge);
            } else {
                dropped.push(edge);
            }
        }
        (graph, dropped)
    }

    pub fn edges(&self) -> &[TeamConnection] {
        &self.edges
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn is_known(&self, team_id: &str) -> bool {
        self.known.contains(team_id)
    }

    pub fn max_connections_per_team(&self) -> usize {
        self.max_connections_per_team
    }

    pub fn get(&self, edge_id: &str) -> Option<&TeamConnection> {
        self.edges.iter().find(|e| e.id == edge_id)
    }

    pub fn connections_for(&self, team_id: &str) -> Vec<&TeamConnection> {
        self.edges.iter().filter(|e| e.touches(team_id)).collect()
    }

    /// Edges incident to `team_id`, either direction.
    pub fn connection_count(&self, team_id: &str) -> usize {
        self.edges.iter().filter(|e| e.touches(team_id)).count()
    }

    /// Direct successors of `team_id` over all connection types.
    pub fn targets_of(&self, team_id: &str) -> Vec<&str> {
        let mut targets: Vec<&str> = self
            .adjacency
            .get(team_id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default();
        targets.sort_unstable();
        targets
    }

    pub fn set_known_teams(&mut self, team_ids: &[String]) {
        self.teams = Vec::with_capacity(team_ids.len());
        self.known.clear();
        for id in team_ids {
            if self.known.insert(id.clone()) {
                self.teams.push(id.clone());
            }
        }
    }

    /// Drop every edge touching a team that is no longer known. Returns the dropped edges.
    pub fn retain_known(&mut self) -> Vec<TeamConnection> {
        let (keep, dropped): (Vec<_>, Vec<_>) = self
            .edges
            .drain(..)
            .partition(|e| self.known.contains(&e.source_team_id) && self.known.contains(&e.target_team_id));
        self.edges = keep;
        if !dropped.is_empty() {
            self.rebuild_adjacency();
        }
        dropped
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    pub fn validate(
        &self,
        source: &str,
        target: &str,
        connection_type: ConnectionType,
    ) -> Result<(), ConnectionRejection> {
        self.validate_excluding(source, target, connection_type, None)
    }

    /// Validation with one existing edge ignored (used when an edge changes type).
    fn validate_excluding(
        &self,
        source: &str,
        target: &str,
        connection_type: ConnectionType,
        exclude: Option<&str>,
    ) -> Result<(), ConnectionRejection> {
        let reject = |reason: RejectionReason, message: String| ConnectionRejection {
            reason,
            message,
            source_team_id: source.to_string(),
            target_team_id: target.to_string(),
            connection_type,
        };

        if source == target {
            return Err(reject(
                RejectionReason::SelfReference,
                "A team cannot connect to itself".into(),
            ));
        }
        for id in [source, target] {
            if !self.known.contains(id) {
                return Err(reject(
                    RejectionReason::SelfReference,
                    format!("Team {id} is not on this canvas"),
                ));
            }
        }

        let counted = |e: &&TeamConnection| exclude != Some(e.id.as_str());

        if self.edges.iter().filter(counted).any(|e| {
            e.source_team_id == source && e.target_team_id == target && e.connection_type == connection_type
        }) {
            return Err(reject(
                RejectionReason::Duplicate,
                format!("A {connection_type} connection from {source} to {target} already exists"),
            ));
        }

        for id in [source, target] {
            let count = self.edges.iter().filter(counted).filter(|e| e.touches(id)).count();
            if count >= self.max_connections_per_team {
                return Err(reject(
                    RejectionReason::MaxConnections,
                    format!(
                        "Team {id} already has {count} connections (max {})",
                        self.max_connections_per_team
                    ),
                ));
            }
        }

        if connection_type.is_hierarchical() && self.reaches(target, source, exclude) {
            return Err(reject(
                RejectionReason::Cycle,
                format!("{source} → {target} would create a reporting cycle"),
            ));
        }

        Ok(())
    }

    /// Depth-first search over `reports_to` edges: is `to` reachable from `from`?
    fn reaches(&self, from: &str, to: &str, exclude: Option<&str>) -> bool {
        // An excluded reports_to edge must not count as a path segment.
        let excluded_pair = exclude
            .and_then(|id| self.get(id))
            .filter(|e| e.connection_type.is_hierarchical())
            .map(|e| (e.source_team_id.as_str(), e.target_team_id.as_str()));

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(children) = self.reports_to.get(node) {
                for child in children {
                    if excluded_pair == Some((node, child.as_str())) {
                        continue;
                    }
                    if !visited.contains(child.as_str()) {
                        stack.push(child.as_str());
                    }
                }
            }
        }
        false
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    pub fn add(&mut self, request: NewConnection) -> Result<TeamConnection, ConnectionRejection> {
        self.add_at(request, Utc::now())
    }

    pub fn add_at(
        &mut self,
        request: NewConnection,
        now: DateTime<Utc>,
    ) -> Result<TeamConnection, ConnectionRejection> {
        self.validate(&request.source_team_id, &request.target_team_id, request.connection_type)?;
        let edge = build_edge(request, now);
        self.link(&edge);
        self.edges.push(edge.clone());
        tracing::debug!(
            id = %edge.id,
            source = %edge.source_team_id,
            target = %edge.target_team_id,
            kind = %edge.connection_type,
            "Connection added"
        );
        Ok(edge)
    }

    /// Validate every request, then commit all accepted edges at once.
    ///
    /// A request is checked against the pre-batch graph and against edges
    /// accepted earlier in the same batch, so a batch can never break an
    /// invariant that single adds would uphold.
    pub fn add_many(&mut self, requests: Vec<NewConnection>) -> BatchResult {
        self.add_many_at(requests, Utc::now())
    }

    pub fn add_many_at(&mut self, requests: Vec<NewConnection>, now: DateTime<Utc>) -> BatchResult {
        let mut staged = self.clone();
        let mut result = BatchResult::default();
        for (index, request) in requests.into_iter().enumerate() {
            match staged.add_at(request, now) {
                Ok(edge) => result.created.push(edge),
                Err(rejection) => result.rejected.push((index, rejection)),
            }
        }
        if !result.created.is_empty() {
            *self = staged;
        }
        tracing::debug!(
            created = result.created.len(),
            rejected = result.rejected.len(),
            "Connection batch applied"
        );
        result
    }

    pub fn remove(&mut self, edge_id: &str) -> bool {
        let Some(idx) = self.edges.iter().position(|e| e.id == edge_id) else {
            return false;
        };
        let edge = self.edges.remove(idx);
        self.unlink(&edge);
        tracing::debug!(id = %edge_id, "Connection removed");
        true
    }

    /// Apply a patch to an edge. A type change is re-validated with the edge
    /// itself excluded. `Ok(None)` when no edge has `edge_id`.
    pub fn update(
        &mut self,
        edge_id: &str,
        patch: ConnectionPatch,
    ) -> Result<Option<TeamConnection>, ConnectionRejection> {
        self.update_at(edge_id, patch, Utc::now())
    }

    pub fn update_at(
        &mut self,
        edge_id: &str,
        patch: ConnectionPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<TeamConnection>, ConnectionRejection> {
        let Some(idx) = self.edges.iter().position(|e| e.id == edge_id) else {
            return Ok(None);
        };

        if let Some(new_type) = patch.connection_type {
            let current = &self.edges[idx];
            if new_type != current.connection_type {
                self.validate_excluding(
                    &current.source_team_id,
                    &current.target_team_id,
                    new_type,
                    Some(edge_id),
                )?;
            }
        }

        let before = self.edges[idx].clone();
        let edge = &mut self.edges[idx];
        if let Some(t) = patch.connection_type {
            edge.connection_type = t;
        }
        if let Some(label) = patch.label {
            edge.label = label;
        }
        if let Some(color) = patch.color {
            edge.color = color;
        }
        if let Some(style) = patch.line_style {
            edge.line_style = style;
        }
        edge.updated_at = now;
        let updated = edge.clone();

        if before.connection_type != updated.connection_type {
            self.unlink(&before);
            self.link(&updated);
        }
        Ok(Some(updated))
    }

    // ------------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------------

    /// The `reports_to` forest, or the single tree under `root`.
    ///
    /// Roots are teams without a `reports_to` parent, in roster order. An
    /// unknown `root` yields an empty forest.
    pub fn hierarchy(&self, root: Option<&str>) -> Vec<HierarchyNode> {
        match root {
            Some(id) if self.known.contains(id) => {
                let mut visited = HashSet::new();
                vec![self.build_tree(id, &mut visited)]
            }
            Some(_) => Vec::new(),
            None => {
                let has_parent: HashSet<&str> = self
                    .reports_to
                    .values()
                    .flat_map(|kids| kids.iter().map(String::as_str))
                    .collect();
                let mut visited = HashSet::new();
                self.teams
                    .iter()
                    .filter(|t| !has_parent.contains(t.as_str()))
                    .map(|t| self.build_tree(t, &mut visited))
                    .collect()
            }
        }
    }

    fn build_tree(&self, team_id: &str, visited: &mut HashSet<String>) -> HierarchyNode {
        visited.insert(team_id.to_string());
        let mut node = HierarchyNode::leaf(team_id);
        // Children in edge insertion order for a stable tree.
        let kids: Vec<&str> = self
            .edges
            .iter()
            .filter(|e| e.connection_type.is_hierarchical() && e.source_team_id == team_id)
            .map(|e| e.target_team_id.as_str())
            .collect();
        for kid in kids {
            if !visited.contains(kid) {
                node.children.push(self.build_tree(kid, visited));
            }
        }
        node
    }

    // ------------------------------------------------------------------------
    // Adjacency bookkeeping
    // ------------------------------------------------------------------------

    fn link(&mut self, edge: &TeamConnection) {
        self.adjacency
            .entry(edge.source_team_id.clone())
            .or_default()
            .insert(edge.target_team_id.clone());
        if edge.connection_type.is_hierarchical() {
            self.reports_to
                .entry(edge.source_team_id.clone())
                .or_default()
                .insert(edge.target_team_id.clone());
        }
    }

    fn unlink(&mut self, edge: &TeamConnection) {
        let (src, tgt) = (&edge.source_team_id, &edge.target_team_id);
        let still_linked = self
            .edges
            .iter()
            .any(|e| &e.source_team_id == src && &e.target_team_id == tgt);
        if !still_linked {
            if let Some(set) = self.adjacency.get_mut(src) {
                set.remove(tgt);
                if set.is_empty() {
                    self.adjacency.remove(src);
                }
            }
        }
        let still_hierarchical = self.edges.iter().any(|e| {
            e.connection_type.is_hierarchical() && &e.source_team_id == src && &e.target_team_id == tgt
        });
        if !still_hierarchical {
            if let Some(set) = self.reports_to.get_mut(src) {
                set.remove(tgt);
                if set.is_empty() {
                    self.reports_to.remove(src);
                }
            }
        }
    }

    fn rebuild_adjacency(&mut self) {
        self.adjacency.clear();
        self.reports_to.clear();
        let edges = std::mem::take(&mut self.edges);
        for edge in &edges {
            self.link(edge);
        }
        self.edges = edges;
    }
}

fn build_edge(request: NewConnection, now: DateTime<Utc>) -> TeamConnection {
    TeamConnection {
        id: uuid::Uuid::new_v4().to_string(),
        source_team_id: request.source_team_id,
        target_team_id: request.target_team_id,
        connection_type: request.connection_type,
        label: request.label,
        color: request.color,
        line_style: request.line_style,
        source_handle: request.source_handle,
        target_handle: request.target_handle,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::LineStyle;

    fn teams(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn graph(names: &[&str]) -> ConnectionGraph {
        ConnectionGraph::new(&teams(names), DEFAULT_MAX_CONNECTIONS_PER_TEAM)
    }

    fn req(s: &str, t: &str, kind: ConnectionType) -> NewConnection {
        NewConnection::new(s, t, kind)
    }

    #[test]
    fn cycle_applies_only_to_reports_to() {
        let mut g = graph(&["a", "b"]);
        g.add(req("a", "b", ConnectionType::ReportsTo)).unwrap();

        let err = g.add(req("b", "a", ConnectionType::ReportsTo)).unwrap_err();
        assert_eq!(err.reason, RejectionReason::Cycle);
        assert_eq!(g.edges().len(), 1);

        g.add(req("b", "a", ConnectionType::CollaboratesWith)).unwrap();
        assert_eq!(g.edges().len(), 2);
    }

    #[test]
    fn transitive_cycle_rejected() {
        let mut g = graph(&["a", "b", "c"]);
        g.add(req("a", "b", ConnectionType::ReportsTo)).unwrap();
        g.add(req("b", "c", ConnectionType::ReportsTo)).unwrap();
        let err = g.add(req("c", "a", ConnectionType::ReportsTo)).unwrap_err();
        assert_eq!(err.reason, RejectionReason::Cycle);
        // A shortcut in the same direction is not a cycle.
        g.add(req("a", "c", ConnectionType::ReportsTo)).unwrap();
    }

    #[test]
    fn self_loops_rejected_for_every_type() {
        let mut g = graph(&["x"]);
        for kind in ConnectionType::ALL {
            let err = g.add(req("x", "x", *kind)).unwrap_err();
            assert_eq!(err.reason, RejectionReason::SelfReference);
        }
        assert!(g.edges().is_empty());
    }

    #[test]
    fn unknown_team_is_self_reference() {
        let g = graph(&["a"]);
        let err = g.validate("a", "ghost", ConnectionType::Supports).unwrap_err();
        assert_eq!(err.reason, RejectionReason::SelfReference);
    }

    #[test]
    fn duplicate_per_type() {
        let mut g = graph(&["a", "b"]);
        g.add(req("a", "b", ConnectionType::Supports)).unwrap();
        let err = g.add(req("a", "b", ConnectionType::Supports)).unwrap_err();
        assert_eq!(err.reason, RejectionReason::Duplicate);
        g.add(req("a", "b", ConnectionType::Custom)).unwrap();
        assert_eq!(g.targets_of("a"), vec!["b"]);
    }

    #[test]
    fn fan_out_limit_counts_both_directions() {
        let mut g = ConnectionGraph::new(&teams(&["a", "b", "c", "d"]), 2);
        g.add(req("a", "b", ConnectionType::Supports)).unwrap();
        g.add(req("c", "a", ConnectionType::Supports)).unwrap();
        let err = g.add(req("a", "d", ConnectionType::Supports)).unwrap_err();
        assert_eq!(err.reason, RejectionReason::MaxConnections);
        // Target side is checked too.
        let err = g.add(req("d", "a", ConnectionType::Custom)).unwrap_err();
        assert_eq!(err.reason, RejectionReason::MaxConnections);
        g.add(req("b", "c", ConnectionType::Supports)).unwrap();
    }

    #[test]
    fn remove_unlinks_adjacency() {
        let mut g = graph(&["a", "b"]);
        let e1 = g.add(req("a", "b", ConnectionType::ReportsTo)).unwrap();
        let e2 = g.add(req("a", "b", ConnectionType::Supports)).unwrap();

        assert!(g.remove(&e1.id));
        assert!(!g.remove(&e1.id));
        // Supports edge keeps the pair adjacent, but the hierarchy link is gone.
        assert_eq!(g.targets_of("a"), vec!["b"]);
        g.add(req("b", "a", ConnectionType::ReportsTo)).unwrap();

        assert!(g.remove(&e2.id));
        assert!(g.targets_of("a").is_empty());
    }

    #[test]
    fn update_revalidates_type_change() {
        let mut g = graph(&["a", "b"]);
        g.add(req("a", "b", ConnectionType::ReportsTo)).unwrap();
        let back = g.add(req("b", "a", ConnectionType::CollaboratesWith)).unwrap();

        let patch = ConnectionPatch {
            connection_type: Some(ConnectionType::ReportsTo),
            ..Default::default()
        };
        let err = g.update(&back.id, patch).unwrap_err();
        assert_eq!(err.reason, RejectionReason::Cycle);
        assert_eq!(g.get(&back.id).unwrap().connection_type, ConnectionType::CollaboratesWith);
    }

    #[test]
    fn update_excludes_itself_and_edits_fields() {
        let mut g = graph(&["a", "b"]);
        let edge = g.add(req("a", "b", ConnectionType::ReportsTo)).unwrap();

        let patch = ConnectionPatch {
            connection_type: Some(ConnectionType::ReportsTo),
            label: Some(Some("manages".into())),
            line_style: Some(Some(LineStyle::Dashed)),
            ..Default::default()
        };
        let updated = g.update(&edge.id, patch).unwrap().unwrap();
        assert_eq!(updated.label.as_deref(), Some("manages"));
        assert_eq!(updated.line_style, Some(LineStyle::Dashed));

        // Changing reports_to → supports then back must not trip over itself.
        let to_supports = ConnectionPatch {
            connection_type: Some(ConnectionType::Supports),
            ..Default::default()
        };
        g.update(&edge.id, to_supports).unwrap().unwrap();
        g.add(req("b", "a", ConnectionType::ReportsTo)).unwrap();

        assert!(g.update("missing", ConnectionPatch::default()).unwrap().is_none());
    }

    #[test]
    fn add_many_is_atomic_and_checks_within_batch() {
        let mut g = graph(&["a", "b", "c"]);
        g.add(req("a", "b", ConnectionType::ReportsTo)).unwrap();

        let result = g.add_many(vec![
            req("b", "c", ConnectionType::ReportsTo),
            req("b", "a", ConnectionType::ReportsTo),
            req("c", "a", ConnectionType::ReportsTo),
            req("b", "c", ConnectionType::ReportsTo),
            req("a", "a", ConnectionType::Custom),
        ]);
        assert_eq!(result.created.len(), 1);
        let reasons: Vec<(usize, RejectionReason)> =
            result.rejected.iter().map(|(i, r)| (*i, r.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (1, RejectionReason::Cycle),
                (2, RejectionReason::Cycle),
                (3, RejectionReason::Duplicate),
                (4, RejectionReason::SelfReference),
            ]
        );
        assert_eq!(g.edges().len(), 2);
    }

    #[test]
    fn hierarchy_forest_and_rooted() {
        let mut g = graph(&["a", "b", "c", "d"]);
        g.add(req("a", "b", ConnectionType::ReportsTo)).unwrap();
        g.add(req("b", "c", ConnectionType::ReportsTo)).unwrap();
        g.add(req("d", "a", ConnectionType::Supports)).unwrap();

        let forest = g.hierarchy(None);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].team_id, "a");
        assert_eq!(forest[0].children[0].team_id, "b");
        assert_eq!(forest[0].children[0].children[0].team_id, "c");
        assert_eq!(forest[1], HierarchyNode::leaf("d"));

        let rooted = g.hierarchy(Some("b"));
        assert_eq!(rooted.len(), 1);
        assert_eq!(rooted[0].size(), 2);
        assert!(g.hierarchy(Some("ghost")).is_empty());
    }

    #[test]
    fn from_edges_and_retain_known() {
        let mut g = graph(&["a", "b", "c"]);
        g.add(req("a", "b", ConnectionType::ReportsTo)).unwrap();
        g.add(req("b", "c", ConnectionType::Supports)).unwrap();
        let edges = g.edges().to_vec();

        let (loaded, dropped) =
            ConnectionGraph::from_edges(&teams(&["a", "b"]), edges, DEFAULT_MAX_CONNECTIONS_PER_TEAM);
        assert_eq!(loaded.edges().len(), 1);
        assert_eq!(dropped.len(), 1);

        g.set_known_teams(&teams(&["a", "b"]));
        let removed = g.retain_known();
        assert_eq!(removed.len(), 1);
        assert_eq!(g.connection_count("b"), 1);
        assert!(g.targets_of("b").is_empty());
    }
}
