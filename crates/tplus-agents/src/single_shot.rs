use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tplus_cache::AnalysisCache;
use tplus_models::{AnalysisMode, Recommendation, Verbosity};
use tracing::{debug, info, warn};

use crate::analyzer::{AnalysisInput, Analyzer};
use crate::model::LanguageModel;
use crate::parser::parse_recommendation;
use crate::prompts::{single_shot_prompt, SINGLE_SHOT_ROLE};

/// One model call per entity. Also the staged pipeline's fallback.
pub struct SingleShotAnalyzer {
    model: Arc<dyn LanguageModel>,
    cache: Arc<AnalysisCache>,
    verbosity: Verbosity,
}

impl SingleShotAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, cache: Arc<AnalysisCache>, verbosity: Verbosity) -> Self {
        Self {
            model,
            cache,
            verbosity,
        }
    }

    /// The model call and parse, without touching the cache. A backend error
    /// becomes a hold at the current price.
    async fn run(&self, input: &AnalysisInput) -> (Recommendation, bool) {
        let prompt = single_shot_prompt(
            &input.snapshot,
            &input.history,
            &input.profile,
            self.verbosity.history_bars(),
        );
        let started = Instant::now();

        match self.model.complete(SINGLE_SHOT_ROLE, &prompt).await {
            Ok(raw) => {
                debug!(
                    entity = %input.entity_id(),
                    model = %self.model.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Single-shot call returned"
                );
                (parse_recommendation(&raw), true)
            }
            Err(e) => {
                warn!(entity = %input.entity_id(), error = %e, "Single-shot call failed");
                (
                    Recommendation::safe_hold(
                        input.snapshot.current_price,
                        format!("error during analysis: {e}"),
                    ),
                    false,
                )
            }
        }
    }
}

#[async_trait]
impl Analyzer for SingleShotAnalyzer {
    fn mode(&self) -> AnalysisMode {
        AnalysisMode::Single
    }

    async fn analyze(&self, input: &AnalysisInput) -> Recommendation {
        let key = self.cache.key(input.entity_id(), AnalysisMode::Single);
        if let Some(hit) = self.cache.lookup(&key).await {
            debug!(key = %key, "Single-shot cache hit");
            return hit;
        }

        let (rec, from_model) = self.run(input).await;
        if from_model {
            self.cache.store(key, rec.clone()).await;
        }
        info!(
            entity = %input.entity_id(),
            action = %rec.action.label(),
            confidence = rec.confidence,
            "Single-shot analysis complete"
        );
        rec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_input, ScriptedModel};
    use std::time::Duration;
    use tplus_models::Action;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn analyzer(model: Arc<ScriptedModel>) -> SingleShotAnalyzer {
        let cache = Arc::new(AnalysisCache::with_system_clock(DAY));
        SingleShotAnalyzer::new(model, cache, Verbosity::Compact)
    }

    #[tokio::test]
    async fn parses_model_reply() {
        let model = Arc::new(ScriptedModel::new().reply_to(
            SINGLE_SHOT_ROLE,
            r#"{"建议":"买入","推荐原因":"放量突破","预测价格":7.4,"预测信心":0.7}"#,
        ));
        let rec = analyzer(model.clone()).analyze(&sample_input("600000")).await;

        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.reason, "放量突破");
        assert_eq!(model.calls(), 1);
        assert!(model.prompts()[0].1.contains("最近3个交易日"));
    }

    #[tokio::test]
    async fn backend_failure_holds_at_current_price() {
        let model = Arc::new(ScriptedModel::new().fail_on(SINGLE_SHOT_ROLE));
        let input = sample_input("600000");
        let rec = analyzer(model).analyze(&input).await;

        assert_eq!(rec.action, Action::Hold);
        assert_eq!(rec.predicted_price, input.snapshot.current_price);
        assert_eq!(rec.predicted_buy_price, input.snapshot.current_price);
        assert_eq!(rec.predicted_sell_price, input.snapshot.current_price);
        assert_eq!(rec.confidence, 0.5);
        assert!(rec.reason.starts_with("error during analysis"));
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let model = Arc::new(ScriptedModel::new().fail_on(SINGLE_SHOT_ROLE));
        let analyzer = analyzer(model.clone());
        let input = sample_input("600000");

        analyzer.analyze(&input).await;
        analyzer.analyze(&input).await;
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn second_call_is_cached() {
        let model = Arc::new(ScriptedModel::new().reply_to(
            SINGLE_SHOT_ROLE,
            r#"{"建议":"卖出","预测信心":0.6}"#,
        ));
        let analyzer = analyzer(model.clone());
        let input = sample_input("000001");

        let first = analyzer.analyze(&input).await;
        let second = analyzer.analyze(&input).await;
        assert_eq!(first, second);
        assert_eq!(model.calls(), 1);
    }
}
