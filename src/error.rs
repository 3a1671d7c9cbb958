use thiserror::Error;

#[derive(Error, Debug)]
pub enum PurseError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Empty or invalid backup: {0}")]
    InvalidBackup(String),

    #[error("Import transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Store deletion blocked: {0}")]
    StoreBlocked(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for PurseError {
    fn from(e: reqwest::Error) -> Self {
        PurseError::Remote(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PurseError>;
