use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Quote source unreachable: all {attempted} requests failed")]
    Unreachable { attempted: usize },

    #[error("Data store not available: {0}")]
    Unavailable(String),
}
