pub mod analyzer;
pub mod claude_cli;
pub mod error;
pub mod model;
pub mod openai;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod single_shot;

pub mod test_support;

pub use analyzer::{AnalysisInput, Analyzer};
pub use error::AgentError;
pub use model::LanguageModel;
pub use parser::parse_recommendation;
pub use pipeline::{AnalysisState, Stage, StagedPipeline};
pub use single_shot::SingleShotAnalyzer;
