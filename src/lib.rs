pub mod cloud;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod validation;

use std::path::Path;
use std::sync::Arc;

pub use config::{CanvasConfig, ConflictStrategy};
pub use engine::canvas_session::CanvasSession;
pub use error::AppError;

use db::repos::canvas::SqliteLayoutStore;
use engine::layout_persistence::{LayoutPersistence, PersistenceOptions};
use engine::layout_store::{RemoteLayoutStore, SettingsLayoutCache};

/// Open a canvas session backed by the database in `data_dir`.
///
/// The local cache lives in `app_settings`. Without `remote`, the same
/// database's canvas tables act as the relational store.
pub fn open_session(
    data_dir: &Path,
    user_id: &str,
    workspace_id: Option<String>,
    remote: Option<Arc<dyn RemoteLayoutStore>>,
) -> Result<CanvasSession, AppError> {
    let pool = db::init_db(data_dir)?;
    let config = CanvasConfig::load(&pool)?;

    let remote = remote.unwrap_or_else(|| Arc::new(SqliteLayoutStore::new(pool.clone())));
    tracing::info!(
        user_id,
        workspace = ?workspace_id,
        remote = remote.name(),
        strategy = ?config.conflict_strategy,
        "Opening canvas session"
    );

    let persistence = LayoutPersistence::new(PersistenceOptions::from(&config), user_id, workspace_id)
        .with_cache(Arc::new(SettingsLayoutCache::new(pool)))
        .with_remote(remote);
    CanvasSession::new(config, persistence)
}
