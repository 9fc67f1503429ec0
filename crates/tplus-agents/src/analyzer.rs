use async_trait::async_trait;
use tplus_models::{AnalysisMode, EntityProfile, HistoryBar, MarketSnapshot, Recommendation};

/// Everything an analysis reads, fetched before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisInput {
    pub snapshot: MarketSnapshot,
    /// Newest first.
    pub history: Vec<HistoryBar>,
    pub profile: EntityProfile,
}

impl AnalysisInput {
    /// Entity the analysis is cached under. The quote's code wins; the
    /// profile code covers feeds that leave it blank.
    pub fn entity_id(&self) -> &str {
        if self.snapshot.code.is_empty() {
            &self.profile.code
        } else {
            &self.snapshot.code
        }
    }
}

/// Produces a recommendation for one entity. Never fails: backend trouble is
/// absorbed into a conservative result.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn mode(&self) -> AnalysisMode;

    async fn analyze(&self, input: &AnalysisInput) -> Recommendation;
}
