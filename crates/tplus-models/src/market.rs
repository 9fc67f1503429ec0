use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One level of the bid or ask ladder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PriceLevel {
    pub price: f64,
    pub volume: i64,
}

/// Live quote for one symbol at the time of analysis.
///
/// Produced by the quote source and read-only afterwards. `amount_10k` is in
/// units of 10k CNY, the market-cap fields in 100M CNY (亿元) and
/// `volume_hand` in lots of 100.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MarketSnapshot {
    /// Plain entity code, e.g. `600000`.
    pub code: String,
    pub name: String,
    pub current_price: f64,
    pub prev_close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
    pub change: f64,
    pub change_percent: f64,
    pub volume_hand: i64,
    pub amount_10k: f64,
    pub turnover_rate: f64,
    pub pe_ratio: f64,
    pub pb_ratio: f64,
    pub amplitude: f64,
    /// 亿元.
    pub circulating_market_value: f64,
    /// 亿元.
    pub total_market_value: f64,
    pub limit_up: f64,
    pub limit_down: f64,
    /// Best five bids, best first.
    pub bids: Vec<PriceLevel>,
    /// Best five asks, best first.
    pub asks: Vec<PriceLevel>,
    /// Exchange timestamp as reported by the feed (`YYYYMMDDhhmmss`).
    pub quote_time: String,
}

/// One trading day of history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryBar {
    pub date: NaiveDate,
    /// Full code, e.g. `sh600000`.
    pub code: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub preclose: f64,
    pub volume: i64,
    pub amount: f64,
    pub turn: f64,
    pub pct_chg: f64,
    pub pe_ttm: f64,
    pub pb_mrq: f64,
    pub ps_ttm: f64,
    pub pcf_ncf_ttm: f64,
    /// Special-treatment (ST) flag.
    pub is_st: bool,
}

/// Reference data for one entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityProfile {
    pub code: String,
    pub name: String,
    pub sector: Option<String>,
    pub ipo_date: String,
    pub total_equity: f64,
    pub liquidity: f64,
    pub total_value: f64,
    pub liquidity_value: f64,
    /// Address used by the quote and history sources.
    pub full_code: String,
    pub exchange_code: Option<String>,
}

impl EntityProfile {
    pub fn sector_or_unknown(&self) -> &str {
        self.sector.as_deref().unwrap_or("未知")
    }
}
