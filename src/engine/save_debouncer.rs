//! Trailing-edge debounced save.
//!
//! A burst of `request_save` calls produces one write of the latest store
//! snapshot once the canvas has been quiet for the configured delay.
//! `flush` must be awaited on shutdown; dropping the debouncer only cancels
//! the pending timer.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use ts_rs::TS;

use crate::engine::canvas_store::CanvasStore;
use crate::engine::layout_persistence::{LayoutPersistence, SaveOutcome};
use crate::error::AppError;

pub type SharedCanvasStore = Arc<Mutex<CanvasStore>>;

/// Lock the shared store. Never hold the guard across an `.await`.
pub fn lock_store(store: &SharedCanvasStore) -> Result<MutexGuard<'_, CanvasStore>, AppError> {
    store
        .lock()
        .map_err(|_| AppError::Internal("canvas store lock poisoned".into()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaveStatus {
    pub is_saving: bool,
    pub pending: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct DebounceState {
    timer: Option<CancellationToken>,
    /// Bumped on every schedule so a fired timer can tell whether it is still current.
    generation: u64,
    status: SaveStatus,
}

pub struct SaveDebouncer {
    store: SharedCanvasStore,
    persistence: Arc<LayoutPersistence>,
    delay: Duration,
    state: Arc<Mutex<DebounceState>>,
    /// Serializes writes so a flush never overlaps a timer-driven save.
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SaveDebouncer {
    pub fn new(store: SharedCanvasStore, persistence: Arc<LayoutPersistence>, delay: Duration) -> Self {
        Self {
            store,
            persistence,
            delay,
            state: Arc::new(Mutex::new(DebounceState::default())),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restart the debounce window.
    pub fn request_save(&self) -> Result<(), AppError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AppError::Internal("request_save called outside a tokio runtime".into()))?;
        let token = CancellationToken::new();
        let generation = {
            let mut state = lock_state(&self.state)?;
            if let Some(previous) = state.timer.replace(token.clone()) {
                previous.cancel();
            }
            state.generation += 1;
            state.status.pending = true;
            state.generation
        };

        let job = SaveJob {
            store: self.store.clone(),
            persistence: self.persistence.clone(),
            state: self.state.clone(),
            write_lock: self.write_lock.clone(),
        };
        let delay = self.delay;

        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(generation, "Debounced canvas save superseded");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match lock_state(&job.state) {
                Ok(mut state) if state.generation == generation => {
                    state.timer = None;
                    state.status.pending = false;
                }
                Ok(_) => return,
                Err(e) => {
                    tracing::error!(error = %e, "Debounced canvas save aborted");
                    return;
                }
            }

            if let Err(e) = job.run().await {
                tracing::warn!(error = %e, "Debounced canvas save failed; changes stay dirty");
            }
        });
        Ok(())
    }

    /// Cancel any pending timer and save right away if there is anything to save.
    ///
    /// Returns `None` when the store was clean and nothing was pending.
    pub async fn flush(&self) -> Result<Option<SaveOutcome>, AppError> {
        let was_pending = {
            let mut state = lock_state(&self.state)?;
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.generation += 1;
            std::mem::replace(&mut state.status.pending, false)
        };
        let dirty = lock_store(&self.store)?.is_dirty();
        if !was_pending && !dirty {
            return Ok(None);
        }
        self.job().run().await.map(Some)
    }

    /// Drop the pending save, if any. Unsaved changes stay dirty.
    pub fn cancel(&self) -> Result<(), AppError> {
        let mut state = lock_state(&self.state)?;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
            tracing::debug!("Pending canvas save cancelled");
        }
        state.generation += 1;
        state.status.pending = false;
        Ok(())
    }

    pub fn status(&self) -> Result<SaveStatus, AppError> {
        Ok(lock_state(&self.state)?.status.clone())
    }

    fn job(&self) -> SaveJob {
        SaveJob {
            store: self.store.clone(),
            persistence: self.persistence.clone(),
            state: self.state.clone(),
            write_lock: self.write_lock.clone(),
        }
    }
}

impl Drop for SaveDebouncer {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
        }
    }
}

struct SaveJob {
    store: SharedCanvasStore,
    persistence: Arc<LayoutPersistence>,
    state: Arc<Mutex<DebounceState>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SaveJob {
    async fn run(&self) -> Result<SaveOutcome, AppError> {
        let _write = self.write_lock.lock().await;

        let (layout, revision) = {
            let store = lock_store(&self.store)?;
            (store.layout(), store.revision())
        };
        lock_state(&self.state)?.status.is_saving = true;

        let result = self.persistence.save(&layout).await;

        let mut state = lock_state(&self.state)?;
        state.status.is_saving = false;
        match result {
            Ok(outcome) => {
                lock_store(&self.store)?.mark_saved(revision, outcome.saved_at);
                state.status.last_saved_at = Some(outcome.saved_at);
                state.status.last_error = None;
                Ok(outcome)
            }
            Err(e) => {
                state.status.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

fn lock_state(state: &Arc<Mutex<DebounceState>>) -> Result<MutexGuard<'_, DebounceState>, AppError> {
    state
        .lock()
        .map_err(|_| AppError::Internal("save debouncer lock poisoned".into()))
}
