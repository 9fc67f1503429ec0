use serde::{Deserialize, Serialize};

use crate::recommendation::{AnalysisMode, Recommendation};

/// One row of the run output.
///
/// Serialized flat, so a successful row carries the recommendation fields
/// at top level and a failed row carries `error` instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResultRecord {
    Analyzed(AnalyzedRecord),
    Failed(FailedRecord),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzedRecord {
    pub code: String,
    pub name: String,
    /// Local time, `YYYY-MM-DD hh:mm:ss`.
    pub analysis_date: String,
    pub mode: AnalysisMode,
    pub current_price: f64,
    pub change_percent: f64,
    #[serde(flatten)]
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedRecord {
    pub code: String,
    pub name: String,
    pub error: String,
}

impl ResultRecord {
    pub fn failed(code: impl Into<String>, name: Option<&str>, error: impl Into<String>) -> Self {
        Self::Failed(FailedRecord {
            code: code.into(),
            name: name.unwrap_or("未知").to_string(),
            error: error.into(),
        })
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Analyzed(r) => &r.code,
            Self::Failed(r) => &r.code,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::Action;

    fn analyzed() -> ResultRecord {
        ResultRecord::Analyzed(AnalyzedRecord {
            code: "600000".to_string(),
            name: "浦发银行".to_string(),
            analysis_date: "2024-03-08 15:01:02".to_string(),
            mode: AnalysisMode::Staged,
            current_price: 7.2,
            change_percent: 1.41,
            recommendation: Recommendation {
                action: Action::Buy,
                reason: "量价齐升".to_string(),
                predicted_price: 7.35,
                predicted_buy_price: 7.18,
                predicted_sell_price: 7.4,
                confidence: 0.72,
            },
        })
    }

    #[test]
    fn analyzed_record_is_flat() {
        let json = serde_json::to_value(analyzed()).unwrap();
        assert_eq!(json["code"], "600000");
        assert_eq!(json["action"], "buy");
        assert_eq!(json["confidence"], 0.72);
        assert_eq!(json["mode"], "staged");
        assert!(json.get("recommendation").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failed_record_carries_error_only() {
        let record = ResultRecord::failed("000001", None, "profile not found");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "未知");
        assert_eq!(json["error"], "profile not found");
        assert!(json.get("action").is_none());
        assert!(record.is_failed());
    }

    #[test]
    fn untagged_read_back_picks_the_right_variant() {
        let rows = vec![analyzed(), ResultRecord::failed("000001", None, "quote unavailable")];
        let json = serde_json::to_string(&rows).unwrap();
        let parsed: Vec<ResultRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        match &parsed[0] {
            ResultRecord::Analyzed(r) => {
                assert_eq!(r.code, "600000");
                assert_eq!(r.recommendation.action, Action::Buy);
            }
            other => panic!("expected analyzed row, got {other:?}"),
        }
        assert!(parsed[1].is_failed());
        assert_eq!(parsed[1].code(), "000001");
    }
}
