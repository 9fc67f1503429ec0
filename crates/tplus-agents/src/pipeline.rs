//! Four-stage role-played analysis.
//!
//! The chain is a fixed sequence `Fundamental -> Technical -> Trader ->
//! Decision`. Each stage makes one model call and fills one field of
//! [`AnalysisState`]. Any stage error discards the state and the single-shot
//! analyzer answers instead.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tplus_cache::AnalysisCache;
use tplus_models::{AnalysisMode, EntityProfile, HistoryBar, MarketSnapshot, Recommendation};
use tracing::{debug, info, warn};

use crate::analyzer::{AnalysisInput, Analyzer};
use crate::error::AgentError;
use crate::model::LanguageModel;
use crate::parser::parse_recommendation;
use crate::prompts;
use crate::single_shot::SingleShotAnalyzer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fundamental,
    Technical,
    Trader,
    Decision,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [
        Stage::Fundamental,
        Stage::Technical,
        Stage::Trader,
        Stage::Decision,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Fundamental => "fundamental",
            Stage::Technical => "technical",
            Stage::Trader => "trader",
            Stage::Decision => "decision",
        }
    }

    pub fn system_role(&self) -> &'static str {
        match self {
            Stage::Fundamental => prompts::FUNDAMENTAL_ROLE,
            Stage::Technical => prompts::TECHNICAL_ROLE,
            Stage::Trader => prompts::TRADER_ROLE,
            Stage::Decision => prompts::DECISION_ROLE,
        }
    }

    /// `None` after `Decision`.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Fundamental => Some(Stage::Technical),
            Stage::Technical => Some(Stage::Trader),
            Stage::Trader => Some(Stage::Decision),
            Stage::Decision => None,
        }
    }
}

/// State threaded through one pipeline run. Inputs are borrowed at entry and
/// never refetched; each stage output is written once.
#[derive(Debug)]
pub struct AnalysisState<'a> {
    snapshot: &'a MarketSnapshot,
    /// Newest first, already cut to what the technical stage may see.
    history: &'a [HistoryBar],
    profile: &'a EntityProfile,
    fundamental_analysis: Option<String>,
    technical_analysis: Option<String>,
    trader_analysis: Option<String>,
    recommendation: Option<Recommendation>,
}

impl<'a> AnalysisState<'a> {
    pub fn new(input: &'a AnalysisInput, technical_bars: usize) -> Self {
        let bars = technical_bars.min(input.history.len());
        Self {
            snapshot: &input.snapshot,
            history: &input.history[..bars],
            profile: &input.profile,
            fundamental_analysis: None,
            technical_analysis: None,
            trader_analysis: None,
            recommendation: None,
        }
    }

    pub fn fundamental_analysis(&self, reader: Stage) -> Result<&str, AgentError> {
        Self::require(&self.fundamental_analysis, reader, "fundamental_analysis")
    }

    pub fn technical_analysis(&self, reader: Stage) -> Result<&str, AgentError> {
        Self::require(&self.technical_analysis, reader, "technical_analysis")
    }

    pub fn trader_analysis(&self, reader: Stage) -> Result<&str, AgentError> {
        Self::require(&self.trader_analysis, reader, "trader_analysis")
    }

    pub fn into_recommendation(self) -> Result<Recommendation, AgentError> {
        self.recommendation.ok_or(AgentError::StageOrder {
            stage: "finish",
            missing: "recommendation",
        })
    }

    fn require<'s>(
        field: &'s Option<String>,
        reader: Stage,
        missing: &'static str,
    ) -> Result<&'s str, AgentError> {
        field.as_deref().ok_or(AgentError::StageOrder {
            stage: reader.name(),
            missing,
        })
    }
}

pub struct StagedPipeline {
    model: Arc<dyn LanguageModel>,
    cache: Arc<AnalysisCache>,
    fallback: SingleShotAnalyzer,
    technical_bars: usize,
}

impl StagedPipeline {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        cache: Arc<AnalysisCache>,
        fallback: SingleShotAnalyzer,
        technical_bars: usize,
    ) -> Self {
        Self {
            model,
            cache,
            fallback,
            technical_bars,
        }
    }

    /// Run one stage: one model call, one field written.
    pub async fn advance<'a>(
        &self,
        stage: Stage,
        mut state: AnalysisState<'a>,
    ) -> Result<AnalysisState<'a>, AgentError> {
        let prompt = match stage {
            Stage::Fundamental => prompts::fundamental_prompt(state.snapshot, state.profile),
            Stage::Technical => prompts::technical_prompt(state.snapshot, state.history),
            Stage::Trader => prompts::trader_prompt(
                state.fundamental_analysis(stage)?,
                state.technical_analysis(stage)?,
            ),
            Stage::Decision => prompts::decision_prompt(
                state.fundamental_analysis(stage)?,
                state.technical_analysis(stage)?,
                state.trader_analysis(stage)?,
            ),
        };

        let started = Instant::now();
        let text = self.model.complete(stage.system_role(), &prompt).await?;
        debug!(
            stage = stage.name(),
            model = %self.model.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage complete"
        );

        match stage {
            Stage::Fundamental => state.fundamental_analysis = Some(text),
            Stage::Technical => state.technical_analysis = Some(text),
            Stage::Trader => state.trader_analysis = Some(text),
            Stage::Decision => state.recommendation = Some(parse_recommendation(&text)),
        }
        Ok(state)
    }

    /// The whole chain, without cache or fallback.
    pub async fn run_stages(&self, input: &AnalysisInput) -> Result<Recommendation, AgentError> {
        let mut state = AnalysisState::new(input, self.technical_bars);
        let mut stage = Some(Stage::Fundamental);
        while let Some(current) = stage {
            state = self.advance(current, state).await?;
            stage = current.next();
        }
        state.into_recommendation()
    }
}

#[async_trait]
impl Analyzer for StagedPipeline {
    fn mode(&self) -> AnalysisMode {
        AnalysisMode::Staged
    }

    async fn analyze(&self, input: &AnalysisInput) -> Recommendation {
        let entity = input.entity_id();
        let key = self.cache.key(entity, AnalysisMode::Staged);
        if let Some(hit) = self.cache.lookup(&key).await {
            debug!(key = %key, "Staged cache hit");
            return hit;
        }

        let started = Instant::now();
        match self.run_stages(input).await {
            Ok(rec) => {
                self.cache.store(key, rec.clone()).await;
                info!(
                    entity = %entity,
                    action = %rec.action.label(),
                    confidence = rec.confidence,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Staged analysis complete"
                );
                rec
            }
            Err(e) => {
                warn!(entity = %entity, error = %e, "Staged analysis failed, falling back to single-shot");
                self.fallback.analyze(input).await
            }
        }
    }
}
