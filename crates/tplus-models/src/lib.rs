pub mod config;
pub mod market;
pub mod recommendation;
pub mod result_record;

pub use config::{
    AnalysisConfig, AppConfig, BatchConfig, DataConfig, LlmBackend, LlmConfig, QuoteConfig,
};
pub use market::{EntityProfile, HistoryBar, MarketSnapshot, PriceLevel};
pub use recommendation::{Action, AnalysisMode, Recommendation, Verbosity};
pub use result_record::{AnalyzedRecord, FailedRecord, ResultRecord};
