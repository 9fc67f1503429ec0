/// Tables read by [`crate::SqliteMarketData`].
///
/// `stock_info` holds one row per entity; `stock_daily` one row per entity
/// per trading day, keyed by the entity's full code. Dates are stored as
/// `YYYY-MM-DD` text.
pub const MARKET_TABLES_DDL: &str = "\
CREATE TABLE IF NOT EXISTS stock_info (
    code            TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    total_equity    REAL,
    liquidity       REAL,
    total_value     REAL,
    liquidity_value REAL,
    sector          TEXT,
    ipo_date        TEXT NOT NULL,
    full_code       TEXT NOT NULL,
    exchange_code   TEXT,
    update_time     TEXT
);
CREATE TABLE IF NOT EXISTS stock_daily (
    date        TEXT NOT NULL,
    code        TEXT NOT NULL,
    open        REAL,
    high        REAL,
    low         REAL,
    close       REAL,
    preclose    REAL,
    volume      INTEGER,
    amount      REAL,
    turn        REAL,
    pctChg      REAL,
    peTTM       REAL,
    pbMRQ       REAL,
    psTTM       REAL,
    pcfNcfTTM   REAL,
    isST        INTEGER,
    update_time TEXT,
    PRIMARY KEY (date, code)
);
CREATE INDEX IF NOT EXISTS idx_daily_code_date ON stock_daily(code, date);
";
