use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

// ============================================================================
// Connection enums
// ============================================================================

/// Relationship a connection expresses between two teams.
///
/// Only `ReportsTo` is hierarchical and therefore subject to cycle checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    ReportsTo,
    CollaboratesWith,
    Supports,
    Custom,
}

impl ConnectionType {
    pub const ALL: &'static [ConnectionType] = &[
        ConnectionType::ReportsTo,
        ConnectionType::CollaboratesWith,
        ConnectionType::Supports,
        ConnectionType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReportsTo => "reports_to",
            Self::CollaboratesWith => "collaborates_with",
            Self::Supports => "supports",
            Self::Custom => "custom",
        }
    }

    pub fn is_hierarchical(&self) -> bool {
        matches!(self, Self::ReportsTo)
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reports_to" => Ok(Self::ReportsTo),
            "collaborates_with" => Ok(Self::CollaboratesWith),
            "supports" => Ok(Self::Supports),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown connection type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
}

impl LineStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Dashed => "dashed",
            Self::Dotted => "dotted",
        }
    }
}

impl FromStr for LineStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solid" => Ok(Self::Solid),
            "dashed" => Ok(Self::Dashed),
            "dotted" => Ok(Self::Dotted),
            other => Err(format!("unknown line style '{other}'")),
        }
    }
}

// ============================================================================
// Positions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TeamPosition {
    pub team_id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamPosition {
    pub fn new(team_id: impl Into<String>, x: f64, y: f64, now: DateTime<Utc>) -> Self {
        Self {
            team_id: team_id.into(),
            x,
            y,
            width: None,
            height: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Connections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TeamConnection {
    pub id: String,
    pub source_team_id: String,
    pub target_team_id: String,
    pub connection_type: ConnectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_style: Option<LineStyle>,
    /// Renderer handle id on the source node (e.g. "bottom").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Composite identity used for duplicate detection and merging.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey {
    pub source_team_id: String,
    pub target_team_id: String,
    pub connection_type: ConnectionType,
}

impl TeamConnection {
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            source_team_id: self.source_team_id.clone(),
            target_team_id: self.target_team_id.clone(),
            connection_type: self.connection_type,
        }
    }

    pub fn touches(&self, team_id: &str) -> bool {
        self.source_team_id == team_id || self.target_team_id == team_id
    }
}

/// Request to create a connection, as produced by a connect gesture or bulk import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewConnection {
    pub source_team_id: String,
    pub target_team_id: String,
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub line_style: Option<LineStyle>,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}

impl NewConnection {
    pub fn new(
        source_team_id: impl Into<String>,
        target_team_id: impl Into<String>,
        connection_type: ConnectionType,
    ) -> Self {
        Self {
            source_team_id: source_team_id.into(),
            target_team_id: target_team_id.into(),
            connection_type,
            label: None,
            color: None,
            line_style: None,
            source_handle: None,
            target_handle: None,
        }
    }
}

/// Partial update for an existing connection. `Some(None)` clears an optional field.
///
/// On the wire an absent key leaves the field alone and an explicit `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<ConnectionType>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_or_null")]
    pub label: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_or_null")]
    pub color: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_or_null")]
    pub line_style: Option<Option<LineStyle>>,
}

/// A key that is present deserializes to `Some`, even when its value is `null`.
fn present_or_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ============================================================================
// View + layout aggregate
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ViewSettings {
    pub zoom: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            center_x: 0.0,
            center_y: 0.0,
        }
    }
}

/// The persisted unit of save, load and conflict resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CanvasLayout {
    pub user_id: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub positions: Vec<TeamPosition>,
    #[serde(default)]
    pub connections: Vec<TeamConnection>,
    #[serde(default)]
    pub view: ViewSettings,
    pub updated_at: DateTime<Utc>,
}

impl CanvasLayout {
    pub fn empty(user_id: impl Into<String>, workspace_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            workspace_id,
            positions: Vec::new(),
            connections: Vec::new(),
            view: ViewSettings::default(),
            updated_at: now,
        }
    }

    pub fn position_of(&self, team_id: &str) -> Option<&TeamPosition> {
        self.positions.iter().find(|p| p.team_id == team_id)
    }
}

/// UI display toggles. Runtime-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DisplayOptions {
    pub show_grid: bool,
    pub show_minimap: bool,
    pub snap_to_grid: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_grid: true,
            show_minimap: true,
            snap_to_grid: false,
        }
    }
}

// ============================================================================
// Remote store contracts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FetchLayoutRequest {
    pub user_id: String,
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FetchLayoutResponse {
    pub success: bool,
    #[serde(default)]
    pub layout: Option<CanvasLayout>,
    /// Team roster known to the backend at fetch time.
    #[serde(default)]
    pub teams: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaveLayoutRequest {
    pub user_id: String,
    pub workspace_id: Option<String>,
    pub positions: Vec<TeamPosition>,
    pub connections: Vec<TeamConnection>,
    pub view: ViewSettings,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaveLayoutResponse {
    pub success: bool,
    #[serde(default)]
    pub positions_saved: u32,
    #[serde(default)]
    pub connections_saved: u32,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub validation_errors: Vec<FieldError>,
}
