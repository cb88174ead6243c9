use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("unknown thread: {0}")]
    UnknownThread(String),

    #[error("system messages are ephemeral and cannot be persisted")]
    EphemeralMessage,

    #[error("store lock poisoned")]
    Lock,
}
