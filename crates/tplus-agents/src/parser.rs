use serde_json::{Map, Value};
use tplus_models::recommendation::DEFAULT_REASON;
use tplus_models::{Action, Recommendation};
use tracing::debug;

use crate::error::AgentError;

/// Accepted keys per output field, tried in order. The `_T+1` spellings are
/// what the models emit when they echo the prompt's field labels.
const ACTION_KEYS: &[&str] = &["建议", "动作", "recommendation", "action"];
const REASON_KEYS: &[&str] = &["推荐原因", "reason"];
const PRICE_KEYS: &[&str] = &["预测价格", "预测价格_T+1", "predicted_price"];
const BUY_PRICE_KEYS: &[&str] = &["预测买入价格", "预测买入价格_T+1", "predicted_buy_price"];
const SELL_PRICE_KEYS: &[&str] = &["预测卖出价格", "预测卖出价格_T+1", "predicted_sell_price"];
const CONFIDENCE_KEYS: &[&str] = &["预测信心", "confidence"];

/// Confidence reported when a decoded object has no confidence key at all.
pub const MISSING_CONFIDENCE: f64 = -0.5;

/// Decode the JSON value a model reply carries.
///
/// Candidates are tried in order and the first that decodes wins: the whole
/// reply when it starts with `{`, the body of each fenced code block, then
/// the first balanced `{...}` span (so prose around the object is ignored).
pub fn extract_json(text: &str) -> Result<Value, AgentError> {
    let text = text.trim();
    let whole = text.starts_with('{').then_some(text);

    whole
        .into_iter()
        .chain(fenced_blocks(text))
        .chain(balanced_object(text))
        .find_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .ok_or_else(|| {
            AgentError::Parse(format!("no JSON object in {} bytes of output", text.len()))
        })
}

/// Bodies of ```` ``` ```` fences, minus an optional language tag line.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.split("```").skip(1).step_by(2).map(|block| {
        let body = match block.split_once('\n') {
            Some((tag, rest)) if !tag.trim_start().starts_with('{') => rest,
            _ => block,
        };
        body.trim()
    })
}

/// First `{...}` span whose braces balance, not counting braces inside
/// string literals.
fn balanced_object(text: &str) -> Option<&str> {
    let open = text.find('{')?;
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[open..].iter().enumerate() {
        if quoted {
            match (escaped, byte) {
                (true, _) => escaped = false,
                (false, b'\\') => escaped = true,
                (false, b'"') => quoted = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => quoted = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..=open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Turn raw model output into a recommendation. Never fails.
///
/// No decodable object, a non-object value, or a field that cannot be coerced
/// all yield [`Recommendation::unparsed`]. A decoded object without a
/// confidence key yields [`MISSING_CONFIDENCE`].
pub fn parse_recommendation(raw: &str) -> Recommendation {
    match try_parse_recommendation(raw) {
        Ok(rec) => rec,
        Err(e) => {
            debug!(error = %e, "Falling back to default recommendation");
            Recommendation::unparsed()
        }
    }
}

fn try_parse_recommendation(raw: &str) -> Result<Recommendation, AgentError> {
    let value = extract_json(raw)?;
    let obj = value
        .as_object()
        .ok_or_else(|| AgentError::Parse("top-level JSON is not an object".to_string()))?;

    let action = ACTION_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .find_map(Action::from_label)
        .unwrap_or_default();

    let reason = match first_present(obj, REASON_KEYS) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => DEFAULT_REASON.to_string(),
    };

    Ok(Recommendation {
        action,
        reason,
        predicted_price: float_or(obj, PRICE_KEYS, 0.0)?,
        predicted_buy_price: float_or(obj, BUY_PRICE_KEYS, 0.0)?,
        predicted_sell_price: float_or(obj, SELL_PRICE_KEYS, 0.0)?,
        confidence: float_or(obj, CONFIDENCE_KEYS, MISSING_CONFIDENCE)?,
    })
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

/// The first present alias coerced to f64, or `missing` when none is present.
fn float_or(obj: &Map<String, Value>, keys: &[&str], missing: f64) -> Result<f64, AgentError> {
    let Some(value) = first_present(obj, keys) else {
        return Ok(missing);
    };
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AgentError::Parse(format!("{} is not numeric: {value}", keys[0])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object_decodes_whole() {
        let value = extract_json(r#"  {"预测信心": 0.75, "推荐原因": "放量"}  "#).unwrap();
        assert_eq!(value["预测信心"], 0.75);
    }

    #[test]
    fn fenced_block_with_language_tag() {
        let value = extract_json("分析结果：\n```json\n{\"预测信心\": 0.75}\n```\n完毕。").unwrap();
        assert_eq!(value["预测信心"], 0.75);
    }

    #[test]
    fn second_fence_used_when_first_is_not_json() {
        let text = "```text\n看多\n```\n然后\n```\n{\"建议\": \"卖出\"}\n```";
        assert_eq!(extract_json(text).unwrap()["建议"], "卖出");
    }

    #[test]
    fn braces_and_quotes_inside_strings() {
        let text = r#"note {"推荐原因": "区间 {7.0} 到 \"7.5}\"", "预测信心": 0.5} end {"x": 1}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["预测信心"], 0.5);
        assert!(value.get("x").is_none());
    }

    #[test]
    fn unbalanced_or_absent_object_is_error() {
        assert!(extract_json("This is just plain text with no JSON at all.").is_err());
        assert!(extract_json(r#"{"建议": "买入""#).is_err());
        assert!(extract_json("} {").is_err());
    }

    #[test]
    fn prose_wrapped_object() {
        let rec = parse_recommendation(r#"prefix {"建议":"买入","预测信心":0.8} suffix"#);
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence, 0.8);
        assert_eq!(rec.reason, DEFAULT_REASON);
        assert_eq!(rec.predicted_price, 0.0);
    }

    #[test]
    fn no_json_and_empty_give_default() {
        assert_eq!(parse_recommendation("no json here"), Recommendation::unparsed());
        assert_eq!(parse_recommendation(""), Recommendation::unparsed());
    }

    #[test]
    fn missing_confidence_is_negative_half() {
        let rec = parse_recommendation(r#"{"建议":"卖出","推荐原因":"跌破支撑"}"#);
        assert_eq!(rec.action, Action::Sell);
        assert_eq!(rec.reason, "跌破支撑");
        assert_eq!(rec.confidence, MISSING_CONFIDENCE);
    }

    #[test]
    fn t_plus_one_suffixed_aliases() {
        let rec = parse_recommendation(
            r#"{"建议":"买入","预测价格_T+1":7.35,"预测买入价格_T+1":"7.18","预测卖出价格_T+1":7.4,"预测信心":"0.66"}"#,
        );
        assert_eq!(rec.predicted_price, 7.35);
        assert_eq!(rec.predicted_buy_price, 7.18);
        assert_eq!(rec.predicted_sell_price, 7.4);
        assert_eq!(rec.confidence, 0.66);
    }

    #[test]
    fn primary_alias_wins_over_suffixed() {
        let rec = parse_recommendation(r#"{"预测价格":7.1,"预测价格_T+1":9.9,"预测信心":0.5}"#);
        assert_eq!(rec.predicted_price, 7.1);
    }

    #[test]
    fn action_falls_through_to_secondary_key() {
        let rec = parse_recommendation(r#"{"建议":"谨慎","动作":"卖","预测信心":0.4}"#);
        assert_eq!(rec.action, Action::Sell);
    }

    #[test]
    fn unknown_action_is_hold() {
        let rec = parse_recommendation(r#"{"建议":"观察一下","预测信心":0.4}"#);
        assert_eq!(rec.action, Action::Hold);
    }

    #[test]
    fn english_keys() {
        let rec = parse_recommendation(
            r#"```json
{"recommendation":"buy","reason":"momentum","predicted_price":10.2,"predicted_buy_price":10.0,"predicted_sell_price":10.5,"confidence":0.9}
```"#,
        );
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.reason, "momentum");
        assert_eq!(rec.predicted_sell_price, 10.5);
        assert_eq!(rec.confidence, 0.9);
    }

    #[test]
    fn uncoercible_number_gives_default() {
        let rec = parse_recommendation(r#"{"建议":"买入","预测价格":"七块二","预测信心":0.8}"#);
        assert_eq!(rec, Recommendation::unparsed());
    }

    #[test]
    fn null_number_gives_default() {
        let rec = parse_recommendation(r#"{"建议":"买入","预测信心":null}"#);
        assert_eq!(rec, Recommendation::unparsed());
    }

    #[test]
    fn top_level_array_gives_default() {
        assert_eq!(parse_recommendation("[1, 2, 3]"), Recommendation::unparsed());
    }

    #[test]
    fn broken_object_gives_default() {
        assert_eq!(
            parse_recommendation(r#"{"建议": "买入", "预测信心": }"#),
            Recommendation::unparsed()
        );
    }
}
