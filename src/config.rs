//! Canvas configuration.
//!
//! Defaults are compiled in; a TOML document or the `app_settings` table can
//! override any subset of fields. The resulting [`CanvasConfig`] is injected
//! into the store, persistence manager and debouncer at construction time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::repos::settings;
use crate::db::settings_keys as keys;
use crate::db::DbPool;
use crate::error::AppError;

/// How to reconcile a local cached layout with the remote copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    LocalWins,
    RemoteWins,
    #[default]
    Merge,
    /// Delegate to an injected resolver; falls back to `RemoteWins` without one.
    AskUser,
}

impl ConflictStrategy {
    pub fn from_setting(s: &str) -> Option<Self> {
        match s {
            "local_wins" => Some(Self::LocalWins),
            "remote_wins" => Some(Self::RemoteWins),
            "merge" => Some(Self::Merge),
            "ask_user" => Some(Self::AskUser),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default, rename_all = "camelCase")]
pub struct CanvasConfig {
    pub max_connections_per_team: usize,
    pub grid_size: f64,
    pub snap_to_grid: bool,
    pub auto_save: bool,
    pub auto_save_debounce_ms: u64,
    pub enable_local_cache: bool,
    pub enable_remote: bool,
    pub conflict_strategy: ConflictStrategy,
    pub remote_timeout_ms: u64,
    pub bounds_margin: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            max_connections_per_team: 10,
            grid_size: 20.0,
            snap_to_grid: false,
            auto_save: true,
            auto_save_debounce_ms: 1000,
            enable_local_cache: true,
            enable_remote: true,
            conflict_strategy: ConflictStrategy::Merge,
            remote_timeout_ms: 10_000,
            bounds_margin: 50.0,
            min_zoom: 0.1,
            max_zoom: 4.0,
            zoom_step: 0.2,
        }
    }
}

impl CanvasConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, AppError> {
        let config: CanvasConfig =
            toml::from_str(s).map_err(|e| AppError::Config(format!("invalid canvas config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with whatever canvas keys exist in `app_settings`.
    pub fn load(pool: &DbPool) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(v) = settings::get(pool, keys::CANVAS_MAX_CONNECTIONS)? {
            config.max_connections_per_team = parse_setting(keys::CANVAS_MAX_CONNECTIONS, &v)?;
        }
        if let Some(v) = settings::get(pool, keys::CANVAS_GRID_SIZE)? {
            config.grid_size = parse_setting(keys::CANVAS_GRID_SIZE, &v)?;
        }
        if let Some(v) = settings::get(pool, keys::CANVAS_SNAP_TO_GRID)? {
            config.snap_to_grid = parse_setting(keys::CANVAS_SNAP_TO_GRID, &v)?;
        }
        if let Some(v) = settings::get(pool, keys::CANVAS_AUTO_SAVE)? {
            config.auto_save = parse_setting(keys::CANVAS_AUTO_SAVE, &v)?;
        }
        if let Some(v) = settings::get(pool, keys::CANVAS_AUTO_SAVE_DEBOUNCE_MS)? {
            config.auto_save_debounce_ms = parse_setting(keys::CANVAS_AUTO_SAVE_DEBOUNCE_MS, &v)?;
        }
        if let Some(v) = settings::get(pool, keys::CANVAS_LOCAL_CACHE)? {
            config.enable_local_cache = parse_setting(keys::CANVAS_LOCAL_CACHE, &v)?;
        }
        if let Some(v) = settings::get(pool, keys::CANVAS_REMOTE)? {
            config.enable_remote = parse_setting(keys::CANVAS_REMOTE, &v)?;
        }
        if let Some(v) = settings::get(pool, keys::CANVAS_CONFLICT_STRATEGY)? {
            config.conflict_strategy = ConflictStrategy::from_setting(&v).ok_or_else(|| {
                AppError::Config(format!(
                    "{}: unknown strategy '{v}'",
                    keys::CANVAS_CONFLICT_STRATEGY
                ))
            })?;
        }
        if let Some(v) = settings::get(pool, keys::CANVAS_REMOTE_TIMEOUT_MS)? {
            config.remote_timeout_ms = parse_setting(keys::CANVAS_REMOTE_TIMEOUT_MS, &v)?;
        }

        config.validate()?;
        tracing::debug!(?config, "Canvas config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_connections_per_team == 0 {
            return Err(AppError::Config("maxConnectionsPerTeam must be at least 1".into()));
        }
        if !(self.grid_size.is_finite() && self.grid_size > 0.0) {
            return Err(AppError::Config("gridSize must be positive".into()));
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom && self.max_zoom.is_finite()) {
            return Err(AppError::Config(format!(
                "zoom range [{}, {}] is invalid",
                self.min_zoom, self.max_zoom
            )));
        }
        if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
            return Err(AppError::Config("zoomStep must be positive".into()));
        }
        if !(self.bounds_margin.is_finite() && self.bounds_margin >= 0.0) {
            return Err(AppError::Config("boundsMargin must be non-negative".into()));
        }
        if self.remote_timeout_ms == 0 {
            return Err(AppError::Config("remoteTimeoutMs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn auto_save_debounce(&self) -> Duration {
        Duration::from_millis(self.auto_save_debounce_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{key}: cannot parse '{raw}'")))
}
