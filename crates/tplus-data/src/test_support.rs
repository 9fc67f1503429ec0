//! In-memory collaborators and fixture builders.
//!
//! The doubles count every call so tests can assert that batch runs use the
//! bulk methods once instead of the per-entity ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tplus_models::{EntityProfile, HistoryBar, MarketSnapshot, PriceLevel};

use crate::error::DataError;
use crate::market_data::MarketData;
use crate::quote::QuoteSource;

/// `600000` -> `sh600000`, anything else -> `sz...`.
pub fn full_code_for(code: &str) -> String {
    if code.starts_with('6') {
        format!("sh{code}")
    } else {
        format!("sz{code}")
    }
}

pub fn sample_profile(code: &str) -> EntityProfile {
    EntityProfile {
        code: code.to_string(),
        name: format!("测试{code}"),
        sector: Some("银行".to_string()),
        ipo_date: "1999-11-10".to_string(),
        total_equity: 293.52,
        liquidity: 293.52,
        total_value: 2113.37,
        liquidity_value: 2113.37,
        full_code: full_code_for(code),
        exchange_code: Some(if code.starts_with('6') { "SH" } else { "SZ" }.to_string()),
    }
}

/// `count` consecutive daily bars ending at `last`, newest first, with
/// closes rising by 0.05 per day from `first_close`.
pub fn sample_bars(full_code: &str, last: NaiveDate, count: usize, first_close: f64) -> Vec<HistoryBar> {
    (0..count)
        .map(|i| {
            let age = (count - 1 - i) as i64;
            let close = first_close + i as f64 * 0.05;
            HistoryBar {
                date: last - chrono::Duration::days(age),
                code: full_code.to_string(),
                open: close - 0.02,
                high: close + 0.05,
                low: close - 0.05,
                close,
                preclose: close - 0.05,
                volume: 1_000_000 + i as i64 * 1_000,
                amount: close * 1_000_000.0,
                turn: 0.12,
                pct_chg: 0.7,
                pe_ttm: 5.2,
                pb_mrq: 0.41,
                ps_ttm: 1.1,
                pcf_ncf_ttm: 2.3,
                is_st: false,
            }
        })
        .rev()
        .collect()
}

pub fn sample_snapshot(code: &str, price: f64) -> MarketSnapshot {
    let ladder = |sign: f64| -> Vec<PriceLevel> {
        (1..=5)
            .map(|k| PriceLevel {
                price: price + sign * 0.01 * k as f64,
                volume: 100 * k,
            })
            .collect()
    };
    MarketSnapshot {
        code: code.to_string(),
        name: format!("测试{code}"),
        current_price: price,
        prev_close: price - 0.1,
        open: price - 0.05,
        high: price + 0.1,
        low: price - 0.1,
        volume: 123_456,
        change: 0.1,
        change_percent: 1.41,
        volume_hand: 123_456,
        amount_10k: 8888.88,
        turnover_rate: 0.04,
        pe_ratio: 5.12,
        pb_ratio: 0.41,
        amplitude: 2.8,
        circulating_market_value: 2113.37,
        total_market_value: 2113.37,
        limit_up: price * 1.1,
        limit_down: price * 0.9,
        bids: ladder(-1.0),
        asks: ladder(1.0),
        quote_time: "20240308150003".to_string(),
    }
}

/// A raw feed line as the quote endpoint returns it.
pub fn quote_line(code: &str, name: &str, price: f64) -> String {
    let p = |x: f64| format!("{x:.2}");
    let mut fields: Vec<String> = vec![
        "1".to_string(),
        name.to_string(),
        code.to_string(),
        p(price),
        p(price - 0.1),
        p(price - 0.05),
        "123456".to_string(),
        "60000".to_string(),
        "63456".to_string(),
    ];
    for k in 1..=5 {
        fields.push(p(price - 0.01 * k as f64));
        fields.push((100 * k).to_string());
    }
    for k in 1..=5 {
        fields.push(p(price + 0.01 * k as f64));
        fields.push((100 * k).to_string());
    }
    fields.extend([
        String::new(),
        "20240308150003".to_string(),
        "0.10".to_string(),
        "1.41".to_string(),
        p(price + 0.1),
        p(price - 0.1),
        format!("{}/123456/88888888", p(price)),
        "123456".to_string(),
        "8888.88".to_string(),
        "0.04".to_string(),
        "5.12".to_string(),
        String::new(),
        p(price + 0.1),
        p(price - 0.1),
        "2.80".to_string(),
        "2113.37".to_string(),
        "2113.37".to_string(),
        "0.41".to_string(),
        p(price * 1.1),
        p(price * 0.9),
        String::new(),
    ]);
    format!("v_{}=\"{}\";", full_code_for(code), fields.join("~"))
}

/// Market data held in maps.
#[derive(Default)]
pub struct InMemoryMarketData {
    profiles: HashMap<String, EntityProfile>,
    history: HashMap<String, Vec<HistoryBar>>,
    pub profile_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub profiles_batch_calls: AtomicUsize,
    pub history_batch_calls: AtomicUsize,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, profile: EntityProfile, bars: Vec<HistoryBar>) -> Self {
        self.history.insert(profile.full_code.clone(), bars);
        self.profiles.insert(profile.code.clone(), profile);
        self
    }

    fn window(bars: &[HistoryBar], since: NaiveDate, until: NaiveDate) -> Vec<HistoryBar> {
        bars.iter()
            .filter(|b| b.date >= since && b.date <= until)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MarketData for InMemoryMarketData {
    async fn get_profile(&self, entity_id: &str) -> Result<Option<EntityProfile>, DataError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.profiles.get(entity_id).cloned())
    }

    async fn get_history(
        &self,
        full_code: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<HistoryBar>, DataError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .history
            .get(full_code)
            .map(|bars| Self::window(bars, since, until))
            .unwrap_or_default())
    }

    async fn get_profiles_batch(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, EntityProfile>, DataError> {
        self.profiles_batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(entity_ids
            .iter()
            .filter_map(|id| self.profiles.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    async fn get_history_batch(
        &self,
        full_codes: &[String],
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<HashMap<String, Vec<HistoryBar>>, DataError> {
        self.history_batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(full_codes
            .iter()
            .filter_map(|code| {
                self.history
                    .get(code)
                    .map(|bars| (code.clone(), Self::window(bars, since, until)))
            })
            .collect())
    }

    async fn get_all_entity_ids(&self) -> Result<Vec<String>, DataError> {
        let mut ids: Vec<String> = self.profiles.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Quote source serving fixed snapshots keyed by full code.
#[derive(Default)]
pub struct StaticQuoteSource {
    quotes: HashMap<String, MarketSnapshot>,
    unreachable: bool,
    pub quote_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    /// Codes asked for across all batch calls.
    pub batch_codes: AtomicUsize,
}

impl StaticQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, full_code: &str, snapshot: MarketSnapshot) -> Self {
        self.quotes.insert(full_code.to_string(), snapshot);
        self
    }

    /// Every fetch fails as if the feed were down.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    async fn get_quote(&self, full_code: &str) -> Result<Option<MarketSnapshot>, DataError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(DataError::Unreachable { attempted: 1 });
        }
        Ok(self.quotes.get(full_code).cloned())
    }

    async fn get_quotes_batch(
        &self,
        full_codes: &[String],
        _delay: Duration,
    ) -> Result<HashMap<String, MarketSnapshot>, DataError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_codes.fetch_add(full_codes.len(), Ordering::SeqCst);
        if self.unreachable {
            return Err(DataError::Unreachable {
                attempted: full_codes.len(),
            });
        }
        Ok(full_codes
            .iter()
            .filter_map(|code| self.quotes.get(code).map(|q| (code.clone(), q.clone())))
            .collect())
    }
}
