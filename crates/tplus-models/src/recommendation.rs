use serde::{Deserialize, Serialize};

/// Reason carried by the default recommendation when no JSON could be read.
pub const DEFAULT_REASON: &str = "analysis complete";

/// Trading action for the next session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl Action {
    /// Map a model-produced label onto an action.
    ///
    /// Accepts the Chinese labels the prompts ask for (`买入`/`卖出`/`保持`
    /// and the short forms `买`/`卖`) plus the English words.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        match label {
            "买入" | "买" => return Some(Self::Buy),
            "卖出" | "卖" => return Some(Self::Sell),
            "保持" | "持有" | "观望" => return Some(Self::Hold),
            _ => {}
        }
        match label.to_ascii_lowercase().as_str() {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            "hold" => Some(Self::Hold),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Buy => "买入",
            Self::Sell => "卖出",
            Self::Hold => "保持",
        }
    }
}

/// The structured T+1 decision.
///
/// Always fully populated: the parser and analyzers fall back to complete
/// defaults instead of leaving fields unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub action: Action,
    pub reason: String,
    pub predicted_price: f64,
    pub predicted_buy_price: f64,
    pub predicted_sell_price: f64,
    /// Nominally 0.0..=1.0. A decoded response without a confidence key
    /// yields -0.5, which is outside that range.
    pub confidence: f64,
}

impl Recommendation {
    /// Result used when model output held no decodable JSON object.
    pub fn unparsed() -> Self {
        Self {
            action: Action::Hold,
            reason: DEFAULT_REASON.to_string(),
            predicted_price: 0.0,
            predicted_buy_price: 0.0,
            predicted_sell_price: 0.0,
            confidence: 0.5,
        }
    }

    /// Hold at the current price, used when the model backend failed.
    pub fn safe_hold(current_price: f64, reason: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            reason: reason.into(),
            predicted_price: current_price,
            predicted_buy_price: current_price,
            predicted_sell_price: current_price,
            confidence: 0.5,
        }
    }
}

/// Which analyzer produced (or should produce) a recommendation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Single,
    #[default]
    Staged,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Staged => "staged",
        }
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much history the single-shot prompt includes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Compact,
    #[default]
    Standard,
    Detailed,
}

impl Verbosity {
    /// Number of most recent history bars embedded in the prompt.
    pub fn history_bars(&self) -> usize {
        match self {
            Self::Compact => 3,
            Self::Standard => 5,
            Self::Detailed => 10,
        }
    }
}
