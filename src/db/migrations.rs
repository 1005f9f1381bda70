use rusqlite::Connection;

use crate::error::AppError;

/// Run the consolidated schema migration. Idempotent.
pub fn run(conn: &Connection) -> Result<(), AppError> {
    tracing::debug!("Running database migrations");

    conn.execute_batch(SCHEMA)?;

    tracing::info!("Database migrations complete");
    Ok(())
}

const SCHEMA: &str = r#"

-- ============================================================================
-- App Settings (key-value; also hosts the local layout cache slots)
-- ============================================================================

CREATE TABLE IF NOT EXISTS app_settings (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- ============================================================================
-- Canvas layouts (one per user + workspace)
-- ============================================================================

CREATE TABLE IF NOT EXISTS canvas_layouts (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    workspace_key   TEXT NOT NULL,
    zoom            REAL NOT NULL DEFAULT 1.0,
    center_x        REAL NOT NULL DEFAULT 0,
    center_y        REAL NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE(user_id, workspace_key)
);

-- ============================================================================
-- Team roster known to the store (owned by team operations, read-only here)
-- ============================================================================

CREATE TABLE IF NOT EXISTS canvas_teams (
    team_id         TEXT NOT NULL,
    workspace_key   TEXT NOT NULL,
    name            TEXT,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (team_id, workspace_key)
);

-- ============================================================================
-- Team positions
-- ============================================================================

CREATE TABLE IF NOT EXISTS canvas_team_positions (
    layout_id   TEXT NOT NULL REFERENCES canvas_layouts(id) ON DELETE CASCADE,
    team_id     TEXT NOT NULL,
    x           REAL NOT NULL,
    y           REAL NOT NULL,
    width       REAL,
    height      REAL,
    sort_order  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (layout_id, team_id)
);

-- ============================================================================
-- Team connections
-- ============================================================================

CREATE TABLE IF NOT EXISTS canvas_team_connections (
    id              TEXT NOT NULL,
    layout_id       TEXT NOT NULL REFERENCES canvas_layouts(id) ON DELETE CASCADE,
    source_team_id  TEXT NOT NULL,
    target_team_id  TEXT NOT NULL,
    connection_type TEXT NOT NULL CHECK(connection_type IN ('reports_to', 'collaborates_with', 'supports', 'custom')),
    label           TEXT,
    color           TEXT,
    line_style      TEXT CHECK(line_style IS NULL OR line_style IN ('solid', 'dashed', 'dotted')),
    source_handle   TEXT,
    target_handle   TEXT,
    sort_order      INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (layout_id, id),
    CHECK(source_team_id <> target_team_id),
    UNIQUE(layout_id, source_team_id, target_team_id, connection_type)
);
CREATE INDEX IF NOT EXISTS idx_ctc_layout ON canvas_team_connections(layout_id);

"#;
