use std::sync::Arc;

use quill_db::{Database, StoreError};
use tracing::error;

use crate::cache::ListingCache;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

/// Shared per-process state, built once at startup and threaded through
/// every handler via the `State` extractor.
pub struct AppStateInner {
    pub db: Database,
    pub cache: ListingCache,
}

/// Run a store operation on the blocking pool.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!(e))
        })?
        .map_err(ApiError::from)
}
