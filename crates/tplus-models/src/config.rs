use serde::{Deserialize, Serialize};

use crate::recommendation::{AnalysisMode, Verbosity};

/// Top-level configuration, read from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub quotes: QuoteConfig,
    pub llm: LlmConfig,
    pub analysis: AnalysisConfig,
    pub batch: BatchConfig,
}

/// Market data store (fundamentals and daily history).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Path to the SQLite file holding `stock_info` and `stock_daily`.
    pub sqlite_path: String,
    /// Calendar days of history fetched per entity.
    pub history_lookback_days: u32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/stock.db".to_string(),
            history_lookback_days: 30,
        }
    }
}

/// Live quote feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuoteConfig {
    /// The full code is appended to this URL.
    pub base_url: String,
    /// Pause between consecutive requests of a batch fetch.
    pub request_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://qt.gtimg.cn/q=".to_string(),
            request_delay_ms: 100,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmBackend {
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    #[default]
    Openai,
    /// The local `claude` CLI.
    ClaudeCli,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub base_url: String,
    pub model: String,
    /// Overridden by `TPLUS_LLM_API_KEY` when set.
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Upper bound for a single model call.
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Openai,
            base_url: "http://localhost:8000/v1".to_string(),
            model: "Qwen3-235B-A22B-Instruct-2507".to_string(),
            api_key: None,
            temperature: 0.1,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub mode: AnalysisMode,
    pub verbosity: Verbosity,
    /// History bars shown to the technical stage.
    pub technical_history_bars: usize,
    pub cache_expiry_hours: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Staged,
            verbosity: Verbosity::Standard,
            technical_history_bars: 15,
            cache_expiry_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub max_workers: usize,
    /// Flush results to the output file every N completions.
    pub save_batch_size: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: 32,
            save_batch_size: None,
        }
    }
}
