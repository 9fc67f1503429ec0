use thiserror::Error;
use tplus_data::DataError;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Bulk data fetch failed: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
