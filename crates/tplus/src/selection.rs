//! Which entities a run analyzes.

use rand::seq::SliceRandom;
use rand::Rng;
use tplus_data::{DataError, MarketData};
use tracing::info;

pub const DEFAULT_SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    One(String),
    List(Vec<String>),
    All,
    /// `n` distinct ids drawn at random from all known entities. When `n`
    /// covers every entity, all are returned in stored order.
    Sample(usize),
}

impl Selection {
    pub async fn resolve<R: Rng + ?Sized>(
        &self,
        market: &dyn MarketData,
        rng: &mut R,
    ) -> Result<Vec<String>, DataError> {
        let ids = match self {
            Selection::One(id) => vec![id.clone()],
            Selection::List(ids) => ids.clone(),
            Selection::All => market.get_all_entity_ids().await?,
            Selection::Sample(n) => {
                let all = market.get_all_entity_ids().await?;
                if *n >= all.len() {
                    all
                } else {
                    all.choose_multiple(rng, *n).cloned().collect()
                }
            }
        };
        info!(selected = ids.len(), "Entities selected");
        Ok(ids)
    }
}
