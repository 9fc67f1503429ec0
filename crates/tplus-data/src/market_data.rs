use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params_from_iter, Connection, Row};
use tplus_models::{EntityProfile, HistoryBar};

use crate::error::DataError;
use crate::schema::MARKET_TABLES_DDL;

/// SQLite's default bound-parameter limit is 999 on older builds.
const MAX_IN_PARAMS: usize = 500;

/// Fundamentals and daily history. Mockable for testing.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// `Ok(None)` when the entity is unknown.
    async fn get_profile(&self, entity_id: &str) -> Result<Option<EntityProfile>, DataError>;

    /// Bars for `full_code` between `since` and `until` inclusive, newest first.
    async fn get_history(
        &self,
        full_code: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<HistoryBar>, DataError>;

    /// Unknown entities are simply absent from the map.
    async fn get_profiles_batch(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, EntityProfile>, DataError>;

    async fn get_history_batch(
        &self,
        full_codes: &[String],
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<HashMap<String, Vec<HistoryBar>>, DataError>;

    async fn get_all_entity_ids(&self) -> Result<Vec<String>, DataError>;
}

/// Market data backed by a local SQLite file.
///
/// One connection shared by every caller behind a `Mutex`.
pub struct SqliteMarketData {
    conn: Mutex<Connection>,
}

const PROFILE_COLUMNS: &str = "code, name, sector, ipo_date, total_equity, liquidity, \
     total_value, liquidity_value, full_code, exchange_code";

const BAR_COLUMNS: &str = "date, code, open, high, low, close, preclose, volume, amount, \
     turn, pctChg, peTTM, pbMRQ, psTTM, pcfNcfTTM, isST";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<EntityProfile> {
    Ok(EntityProfile {
        code: row.get(0)?,
        name: row.get(1)?,
        sector: row.get(2)?,
        ipo_date: row.get(3)?,
        total_equity: row.get::<_, Option<f64>>(4)?.unwrap_or_default(),
        liquidity: row.get::<_, Option<f64>>(5)?.unwrap_or_default(),
        total_value: row.get::<_, Option<f64>>(6)?.unwrap_or_default(),
        liquidity_value: row.get::<_, Option<f64>>(7)?.unwrap_or_default(),
        full_code: row.get(8)?,
        exchange_code: row.get(9)?,
    })
}

fn bar_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryBar> {
    let num = |idx: usize| -> rusqlite::Result<f64> {
        Ok(row.get::<_, Option<f64>>(idx)?.unwrap_or_default())
    };
    Ok(HistoryBar {
        date: row.get(0)?,
        code: row.get(1)?,
        open: num(2)?,
        high: num(3)?,
        low: num(4)?,
        close: num(5)?,
        preclose: num(6)?,
        volume: row.get::<_, Option<i64>>(7)?.unwrap_or_default(),
        amount: num(8)?,
        turn: num(9)?,
        pct_chg: num(10)?,
        pe_ttm: num(11)?,
        pb_mrq: num(12)?,
        ps_ttm: num(13)?,
        pcf_ncf_ttm: num(14)?,
        is_st: row.get::<_, Option<bool>>(15)?.unwrap_or(false),
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl SqliteMarketData {
    /// Open (or create) the market data file. Enables WAL so an external
    /// importer can write while analyses read.
    pub fn open(path: &str) -> Result<Self, DataError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(MARKET_TABLES_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database with the schema created. Useful for tests.
    pub fn open_in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MARKET_TABLES_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DataError> {
        self.conn
            .lock()
            .map_err(|e| DataError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    /// Insert or replace entity profiles in one transaction.
    pub fn upsert_profiles(&self, profiles: &[EntityProfile]) -> Result<(), DataError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO stock_info \
                 (code, name, sector, ipo_date, total_equity, liquidity, total_value, \
                  liquidity_value, full_code, exchange_code, update_time) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))",
            )?;
            for p in profiles {
                stmt.execute(rusqlite::params![
                    p.code,
                    p.name,
                    p.sector,
                    p.ipo_date,
                    p.total_equity,
                    p.liquidity,
                    p.total_value,
                    p.liquidity_value,
                    p.full_code,
                    p.exchange_code,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace daily bars in one transaction.
    pub fn upsert_bars(&self, bars: &[HistoryBar]) -> Result<(), DataError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO stock_daily \
                 (date, code, open, high, low, close, preclose, volume, amount, turn, pctChg, \
                  peTTM, pbMRQ, psTTM, pcfNcfTTM, isST, update_time) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                         datetime('now'))",
            )?;
            for b in bars {
                stmt.execute(rusqlite::params![
                    b.date,
                    b.code,
                    b.open,
                    b.high,
                    b.low,
                    b.close,
                    b.preclose,
                    b.volume,
                    b.amount,
                    b.turn,
                    b.pct_chg,
                    b.pe_ttm,
                    b.pb_mrq,
                    b.ps_ttm,
                    b.pcf_ncf_ttm,
                    b.is_st,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl MarketData for SqliteMarketData {
    async fn get_profile(&self, entity_id: &str) -> Result<Option<EntityProfile>, DataError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {PROFILE_COLUMNS} FROM stock_info WHERE code = ?1"
        ))?;
        match stmt.query_row([entity_id], profile_from_row) {
            Ok(profile) => Ok(Some(profile)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DataError::Sqlite(e)),
        }
    }

    async fn get_history(
        &self,
        full_code: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<HistoryBar>, DataError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {BAR_COLUMNS} FROM stock_daily \
             WHERE code = ?1 AND date >= ?2 AND date <= ?3 ORDER BY date DESC"
        ))?;
        let bars = stmt
            .query_map(rusqlite::params![full_code, since, until], bar_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bars)
    }

    async fn get_profiles_batch(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, EntityProfile>, DataError> {
        let conn = self.lock()?;
        let mut out = HashMap::with_capacity(entity_ids.len());
        for chunk in entity_ids.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT {PROFILE_COLUMNS} FROM stock_info WHERE code IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), profile_from_row)?;
            for row in rows {
                let profile = row?;
                out.insert(profile.code.clone(), profile);
            }
        }
        Ok(out)
    }

    async fn get_history_batch(
        &self,
        full_codes: &[String],
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<HashMap<String, Vec<HistoryBar>>, DataError> {
        let conn = self.lock()?;
        let mut out: HashMap<String, Vec<HistoryBar>> = HashMap::with_capacity(full_codes.len());
        let since = since.format("%Y-%m-%d").to_string();
        let until = until.format("%Y-%m-%d").to_string();
        for chunk in full_codes.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT {BAR_COLUMNS} FROM stock_daily \
                 WHERE code IN ({}) AND date >= ? AND date <= ? \
                 ORDER BY code, date DESC",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let params = chunk.iter().chain([&since, &until]);
            let rows = stmt.query_map(params_from_iter(params), bar_from_row)?;
            for row in rows {
                let bar = row?;
                out.entry(bar.code.clone()).or_default().push(bar);
            }
        }
        Ok(out)
    }

    async fn get_all_entity_ids(&self) -> Result<Vec<String>, DataError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT code FROM stock_info ORDER BY code")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
