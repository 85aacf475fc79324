use thiserror::Error;

/// Errors produced by the SQLite store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    /// A previous holder of the connection panicked.
    #[error("Database connection lock poisoned")]
    Poisoned,

    #[error("Store task failed: {0}")]
    Task(String),
}

impl From<StoreError> for ntb_core::Error {
    fn from(e: StoreError) -> Self {
        ntb_core::Error::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
