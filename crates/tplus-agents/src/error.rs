use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model backend error: {0}")]
    Backend(String),

    #[error("Model call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Stage {stage} ran before {missing} was produced")]
    StageOrder {
        stage: &'static str,
        missing: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
