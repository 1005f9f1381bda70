/// Canonical settings key constants for `app_settings` table.
///
/// Use these instead of raw string literals to prevent typo-based key mismatches.

/// Maximum edges a single team may participate in (either direction).
pub const CANVAS_MAX_CONNECTIONS: &str = "canvas_max_connections_per_team";

/// Grid size in canvas units used by snap-to-grid.
pub const CANVAS_GRID_SIZE: &str = "canvas_grid_size";

/// `"true"` / `"false"`: snap dragged nodes to the grid.
pub const CANVAS_SNAP_TO_GRID: &str = "canvas_snap_to_grid";

/// `"true"` / `"false"`: schedule a debounced save after every mutation.
pub const CANVAS_AUTO_SAVE: &str = "canvas_auto_save";

/// Trailing-edge debounce window for auto-save, in milliseconds.
pub const CANVAS_AUTO_SAVE_DEBOUNCE_MS: &str = "canvas_auto_save_debounce_ms";

/// `"true"` / `"false"`: keep a local cached copy of the layout.
pub const CANVAS_LOCAL_CACHE: &str = "canvas_enable_local_cache";

/// `"true"` / `"false"`: read/write the remote layout store.
pub const CANVAS_REMOTE: &str = "canvas_enable_remote";

/// One of `local_wins`, `remote_wins`, `merge`, `ask_user`.
pub const CANVAS_CONFLICT_STRATEGY: &str = "canvas_conflict_strategy";

/// Timeout applied to every remote layout request, in milliseconds.
pub const CANVAS_REMOTE_TIMEOUT_MS: &str = "canvas_remote_timeout_ms";

/// Prefix of the per-workspace local layout cache slot.
pub const CANVAS_LAYOUT_CACHE_PREFIX: &str = "canvas_layout:";

/// Cache slot key for a workspace (`canvas_layout:default` when none).
pub fn canvas_layout_cache_key(workspace_id: Option<&str>) -> String {
    format!(
        "{CANVAS_LAYOUT_CACHE_PREFIX}{}",
        workspace_id.unwrap_or("default")
    )
}
