//! tplus - T+1 stock recommendations from a language model
//!
//! Fetches fundamentals, daily history and live quotes, runs a staged
//! four-role analysis (or a single prompt) per stock, and writes the
//! recommendations as a JSON array.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tplus::models::AppConfig;
//! use tplus::batch::{BatchOptions, BatchOrchestrator};
//! use tplus::agents::{Analyzer, StagedPipeline, SingleShotAnalyzer};
//! use tplus::cache::AnalysisCache;
//! ```

pub mod batch;
pub mod error;
pub mod selection;
pub mod summary;
pub mod writer;

pub use tplus_agents as agents;
pub use tplus_cache as cache;
pub use tplus_data as data;
pub use tplus_models as models;

pub use batch::{BatchOptions, BatchOrchestrator};
pub use error::BatchError;
pub use selection::Selection;

use std::sync::Arc;
use std::time::Duration;

use tplus_agents::claude_cli::{ClaudeCli, ClaudeCliConfig};
use tplus_agents::openai::OpenAiCompatible;
use tplus_agents::{AgentError, Analyzer, LanguageModel, SingleShotAnalyzer, StagedPipeline};
use tplus_cache::{AnalysisCache, Clock, SystemClock};
use tplus_data::{HttpQuoteSource, SqliteMarketData};
use tplus_models::{AnalysisMode, AppConfig, LlmBackend};

/// Build the configured language model backend.
pub fn build_model(config: &AppConfig) -> Result<Arc<dyn LanguageModel>, AgentError> {
    let llm = &config.llm;
    let model: Arc<dyn LanguageModel> = match llm.backend {
        LlmBackend::Openai => Arc::new(OpenAiCompatible::from_config(llm)?),
        LlmBackend::ClaudeCli => Arc::new(ClaudeCli::new(ClaudeCliConfig {
            model: llm.model.clone(),
            timeout: Duration::from_secs(llm.timeout_seconds),
            ..ClaudeCliConfig::default()
        })),
    };
    Ok(model)
}

/// Build the analyzer for `mode`, sharing one cache between the staged
/// pipeline and its single-shot fallback.
pub fn build_analyzer(
    config: &AppConfig,
    mode: AnalysisMode,
    model: Arc<dyn LanguageModel>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn Analyzer> {
    let expiry = Duration::from_secs(config.analysis.cache_expiry_hours * 60 * 60);
    let cache = Arc::new(AnalysisCache::new(expiry, clock));
    let single = SingleShotAnalyzer::new(model.clone(), cache.clone(), config.analysis.verbosity);

    match mode {
        AnalysisMode::Single => Arc::new(single),
        AnalysisMode::Staged => Arc::new(StagedPipeline::new(
            model,
            cache,
            single,
            config.analysis.technical_history_bars,
        )),
    }
}

/// Build a BatchOrchestrator from configuration, backed by SQLite market data
/// and the HTTP quote feed.
pub fn build_orchestrator(
    config: &AppConfig,
    mode: AnalysisMode,
) -> Result<BatchOrchestrator, anyhow::Error> {
    let market = Arc::new(SqliteMarketData::open(&config.data.sqlite_path)?);
    let quotes = Arc::new(HttpQuoteSource::new(&config.quotes)?);
    let model = build_model(config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let analyzer = build_analyzer(config, mode, model, clock.clone());

    Ok(BatchOrchestrator::new(market, quotes, analyzer, clock)
        .with_lookback_days(config.data.history_lookback_days)
        .with_quote_delay(Duration::from_millis(config.quotes.request_delay_ms)))
}

/// Batch options from configuration; explicit CLI values override.
pub fn batch_options(
    config: &AppConfig,
    save_batch_size: Option<usize>,
    output: Option<std::path::PathBuf>,
) -> BatchOptions {
    BatchOptions {
        max_workers: config.batch.max_workers,
        batch_size: save_batch_size.or(config.batch.save_batch_size),
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tplus_agents::test_support::ScriptedModel;

    #[test]
    fn analyzer_follows_mode() {
        let config = AppConfig::default();
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let staged = build_analyzer(&config, AnalysisMode::Staged, model.clone(), clock.clone());
        let single = build_analyzer(&config, AnalysisMode::Single, model, clock);
        assert_eq!(staged.mode(), AnalysisMode::Staged);
        assert_eq!(single.mode(), AnalysisMode::Single);
    }

    #[test]
    fn claude_backend_needs_no_key() {
        let mut config = AppConfig::default();
        config.llm.backend = LlmBackend::ClaudeCli;
        config.llm.model = "claude-sonnet-4-5-20250929".to_string();
        let model = build_model(&config).unwrap();
        assert_eq!(model.name(), "claude-sonnet-4-5-20250929");
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config: AppConfig =
            toml::from_str(include_str!("../../../config/tplus.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn cli_batch_size_overrides_config() {
        let mut config = AppConfig::default();
        config.batch.save_batch_size = Some(50);
        assert_eq!(batch_options(&config, Some(5), None).batch_size, Some(5));
        assert_eq!(batch_options(&config, None, None).batch_size, Some(50));
        assert_eq!(batch_options(&config, None, None).max_workers, 32);
    }
}
