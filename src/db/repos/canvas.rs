use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::{
    CanvasLayout, ConnectionType, FetchLayoutRequest, FetchLayoutResponse, FieldError, LineStyle,
    SaveLayoutRequest, SaveLayoutResponse, TeamConnection, TeamPosition, ViewSettings,
};
use crate::db::DbPool;
use crate::engine::geometry;
use crate::engine::layout_store::RemoteLayoutStore;
use crate::error::AppError;

/// Workspace key used for layouts saved without a workspace.
pub const DEFAULT_WORKSPACE_KEY: &str = "default";

fn workspace_key(workspace_id: Option<&str>) -> &str {
    workspace_id.unwrap_or(DEFAULT_WORKSPACE_KEY)
}

// ============================================================================
// Row mappers
// ============================================================================

fn text_enum<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn row_to_position(row: &Row) -> rusqlite::Result<TeamPosition> {
    Ok(TeamPosition {
        team_id: row.get(0)?,
        x: row.get(1)?,
        y: row.get(2)?,
        width: row.get(3)?,
        height: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_connection(row: &Row) -> rusqlite::Result<TeamConnection> {
    let line_style: Option<String> = row.get(6)?;
    let line_style = line_style
        .map(|s| {
            LineStyle::from_str(&s)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))
        })
        .transpose()?;
    Ok(TeamConnection {
        id: row.get(0)?,
        source_team_id: row.get(1)?,
        target_team_id: row.get(2)?,
        connection_type: text_enum::<ConnectionType>(row, 3)?,
        label: row.get(4)?,
        color: row.get(5)?,
        line_style,
        source_handle: row.get(7)?,
        target_handle: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

// ============================================================================
// Layouts
// ============================================================================

/// Load the layout saved by `user_id` for a workspace, if any.
pub fn get_layout(
    pool: &DbPool,
    user_id: &str,
    workspace_id: Option<&str>,
) -> Result<Option<CanvasLayout>, AppError> {
    let conn = pool.get()?;
    let header = conn
        .query_row(
            "SELECT id, zoom, center_x, center_y, updated_at
             FROM canvas_layouts WHERE user_id = ?1 AND workspace_key = ?2",
            params![user_id, workspace_key(workspace_id)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    ViewSettings {
                        zoom: row.get(1)?,
                        center_x: row.get(2)?,
                        center_y: row.get(3)?,
                    },
                    row.get::<_, DateTime<Utc>>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((layout_id, view, updated_at)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT team_id, x, y, width, height, created_at, updated_at
         FROM canvas_team_positions WHERE layout_id = ?1 ORDER BY sort_order",
    )?;
    let positions = stmt
        .query_map(params![layout_id], row_to_position)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, source_team_id, target_team_id, connection_type, label, color,
                line_style, source_handle, target_handle, created_at, updated_at
         FROM canvas_team_connections WHERE layout_id = ?1 ORDER BY sort_order",
    )?;
    let connections = stmt
        .query_map(params![layout_id], row_to_connection)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(CanvasLayout {
        user_id: user_id.to_string(),
        workspace_id: workspace_id.map(str::to_string),
        positions,
        connections,
        view,
        updated_at,
    }))
}

/// Field-level problems that would make the payload unsafe to store.
pub fn validate_save(request: &SaveLayoutRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if request.user_id.trim().is_empty() {
        errors.push(FieldError {
            field: "userId".into(),
            message: "must not be empty".into(),
        });
    }
    for (i, p) in request.positions.iter().enumerate() {
        if !geometry::is_valid_position(p.x, p.y) {
            errors.push(FieldError {
                field: format!("positions[{i}]"),
                message: format!("position of team {} is out of range", p.team_id),
            });
        }
    }
    for (i, c) in request.connections.iter().enumerate() {
        if c.source_team_id == c.target_team_id {
            errors.push(FieldError {
                field: format!("connections[{i}]"),
                message: "source and target must differ".into(),
            });
        }
    }
    if !(request.view.zoom.is_finite() && request.view.zoom > 0.0) {
        errors.push(FieldError {
            field: "view.zoom".into(),
            message: "must be a positive number".into(),
        });
    }
    errors
}

/// Replace the stored layout in one transaction. Returns (positions, connections) written.
pub fn save_layout(pool: &DbPool, request: &SaveLayoutRequest) -> Result<(u32, u32), AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction().map_err(AppError::Database)?;
    let ws = workspace_key(request.workspace_id.as_deref());
    let now = Utc::now();

    tx.execute(
        "INSERT INTO canvas_layouts (id, user_id, workspace_key, zoom, center_x, center_y, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(user_id, workspace_key) DO UPDATE SET
            zoom = ?4, center_x = ?5, center_y = ?6, updated_at = ?8",
        params![
            uuid::Uuid::new_v4().to_string(),
            request.user_id,
            ws,
            request.view.zoom,
            request.view.center_x,
            request.view.center_y,
            now,
            request.updated_at,
        ],
    )?;
    let layout_id: String = tx.query_row(
        "SELECT id FROM canvas_layouts WHERE user_id = ?1 AND workspace_key = ?2",
        params![request.user_id, ws],
        |row| row.get(0),
    )?;

    tx.execute("DELETE FROM canvas_team_positions WHERE layout_id = ?1", params![layout_id])?;
    tx.execute("DELETE FROM canvas_team_connections WHERE layout_id = ?1", params![layout_id])?;

    {
        let mut insert = tx.prepare(
            "INSERT INTO canvas_team_positions
                (layout_id, team_id, x, y, width, height, sort_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for (i, p) in request.positions.iter().enumerate() {
            insert.execute(params![
                layout_id, p.team_id, p.x, p.y, p.width, p.height, i as i64, p.created_at, p.updated_at,
            ])?;
        }

        let mut insert = tx.prepare(
            "INSERT INTO canvas_team_connections
                (id, layout_id, source_team_id, target_team_id, connection_type, label, color,
                 line_style, source_handle, target_handle, sort_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for (i, c) in request.connections.iter().enumerate() {
            insert.execute(params![
                c.id,
                layout_id,
                c.source_team_id,
                c.target_team_id,
                c.connection_type.as_str(),
                c.label,
                c.color,
                c.line_style.map(|s| s.as_str()),
                c.source_handle,
                c.target_handle,
                i as i64,
                c.created_at,
                c.updated_at,
            ])?;
        }
    }

    tx.commit()?;
    Ok((request.positions.len() as u32, request.connections.len() as u32))
}

pub fn delete_layout(pool: &DbPool, user_id: &str, workspace_id: Option<&str>) -> Result<bool, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "DELETE FROM canvas_layouts WHERE user_id = ?1 AND workspace_key = ?2",
        params![user_id, workspace_key(workspace_id)],
    )?;
    Ok(rows > 0)
}

// ============================================================================
// Team roster
// ============================================================================

pub fn upsert_team(pool: &DbPool, workspace_id: Option<&str>, team_id: &str, name: Option<&str>) -> Result<(), AppError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO canvas_teams (team_id, workspace_key, name, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(team_id, workspace_key) DO UPDATE SET name = ?3",
        params![team_id, workspace_key(workspace_id), name, Utc::now()],
    )?;
    Ok(())
}

pub fn delete_team(pool: &DbPool, workspace_id: Option<&str>, team_id: &str) -> Result<bool, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "DELETE FROM canvas_teams WHERE team_id = ?1 AND workspace_key = ?2",
        params![team_id, workspace_key(workspace_id)],
    )?;
    Ok(rows > 0)
}

/// Team ids registered for a workspace, oldest first.
pub fn list_teams(pool: &DbPool, workspace_id: Option<&str>) -> Result<Vec<String>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT team_id FROM canvas_teams WHERE workspace_key = ?1 ORDER BY created_at, team_id",
    )?;
    let rows = stmt.query_map(params![workspace_key(workspace_id)], |row| row.get::<_, String>(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ============================================================================
// RemoteLayoutStore over the local database
// ============================================================================

/// Relational layout store backed by the local SQLite database.
pub struct SqliteLayoutStore {
    pool: DbPool,
}

impl SqliteLayoutStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemoteLayoutStore for SqliteLayoutStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch_layout(&self, request: FetchLayoutRequest) -> Result<FetchLayoutResponse, AppError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<FetchLayoutResponse, AppError> {
            let ws = request.workspace_id.as_deref();
            let layout = get_layout(&pool, &request.user_id, ws)?;
            let teams = list_teams(&pool, ws)?;
            Ok(FetchLayoutResponse {
                success: true,
                layout,
                // An empty roster means nobody registered teams here; don't filter on it.
                teams: if teams.is_empty() { None } else { Some(teams) },
                error: None,
            })
        })
        .await
        .map_err(|e| AppError::Internal(format!("layout fetch task failed: {e}")))?
    }

    async fn save_layout(&self, request: SaveLayoutRequest) -> Result<SaveLayoutResponse, AppError> {
        let validation_errors = validate_save(&request);
        if !validation_errors.is_empty() {
            return Ok(SaveLayoutResponse {
                success: false,
                positions_saved: 0,
                connections_saved: 0,
                saved_at: None,
                error: Some("Layout failed validation".into()),
                validation_errors,
            });
        }

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<SaveLayoutResponse, AppError> {
            let (positions_saved, connections_saved) = save_layout(&pool, &request)?;
            Ok(SaveLayoutResponse {
                success: true,
                positions_saved,
                connections_saved,
                saved_at: Some(request.updated_at),
                error: None,
                validation_errors: Vec::new(),
            })
        })
        .await
        .map_err(|e| AppError::Internal(format!("layout save task failed: {e}")))?
    }
}
