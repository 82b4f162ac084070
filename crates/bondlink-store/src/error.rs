//! Error types for the conversation store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}
