use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Content not found: {0}")]
    MissingContent(String),

    #[error("Cannot create data directory: {0}")]
    Io(#[from] std::io::Error),
}
