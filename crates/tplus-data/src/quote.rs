use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::GBK;
use tplus_models::{MarketSnapshot, PriceLevel, QuoteConfig};
use tracing::{debug, warn};

use crate::error::DataError;

/// The feed returns this many `~`-separated fields at minimum.
const MIN_QUOTE_FIELDS: usize = 49;

/// Live quotes. Mockable for testing.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// `Ok(None)` when the feed has no usable quote for `full_code`.
    async fn get_quote(&self, full_code: &str) -> Result<Option<MarketSnapshot>, DataError>;

    /// Fetch many quotes, pausing `delay` between requests. Codes whose
    /// fetch failed are absent from the map.
    async fn get_quotes_batch(
        &self,
        full_codes: &[String],
        delay: Duration,
    ) -> Result<HashMap<String, MarketSnapshot>, DataError>;
}

/// Quote source for the Tencent text feed (`v_sh600000="1~name~code~..."`).
pub struct HttpQuoteSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpQuoteSource {
    pub fn new(config: &QuoteConfig) -> Result<Self, DataError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }

    async fn fetch_text(&self, full_code: &str) -> Result<String, DataError> {
        let url = format!("{}{}", self.base_url, full_code);
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let (text, _, had_errors) = GBK.decode(&bytes);
        if had_errors {
            debug!(full_code, "Quote body had invalid GBK sequences");
        }
        Ok(text.into_owned())
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn get_quote(&self, full_code: &str) -> Result<Option<MarketSnapshot>, DataError> {
        let text = self.fetch_text(full_code).await?;
        let snapshot = parse_quote_response(&text);
        if snapshot.is_none() {
            warn!(full_code, "Unparseable quote response");
        }
        Ok(snapshot)
    }

    async fn get_quotes_batch(
        &self,
        full_codes: &[String],
        delay: Duration,
    ) -> Result<HashMap<String, MarketSnapshot>, DataError> {
        let mut out = HashMap::with_capacity(full_codes.len());
        let mut transport_failures = 0usize;

        for (i, code) in full_codes.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.get_quote(code).await {
                Ok(Some(snapshot)) => {
                    out.insert(code.clone(), snapshot);
                }
                Ok(None) => {}
                Err(e) => {
                    transport_failures += 1;
                    warn!(full_code = %code, error = %e, "Quote fetch failed");
                }
            }
        }

        if !full_codes.is_empty() && transport_failures == full_codes.len() {
            return Err(DataError::Unreachable {
                attempted: full_codes.len(),
            });
        }

        debug!(
            requested = full_codes.len(),
            received = out.len(),
            "Quote batch complete"
        );
        Ok(out)
    }
}

fn float_field(value: &str) -> Option<f64> {
    if value.is_empty() {
        Some(0.0)
    } else {
        value.parse().ok()
    }
}

fn int_field(value: &str) -> Option<i64> {
    if value.is_empty() {
        Some(0)
    } else {
        value.parse().ok()
    }
}

/// Parse one quote line of the Tencent feed.
///
/// Returns `None` for an empty body, a line with fewer than 49 fields, or any
/// numeric field that does not parse. Empty numeric fields read as zero.
pub fn parse_quote_response(text: &str) -> Option<MarketSnapshot> {
    let text = text.trim();
    let (_, payload) = text.split_once('=')?;
    let payload = payload.trim().trim_end_matches(';').trim_matches('"');
    let v: Vec<&str> = payload.split('~').collect();
    if v.len() < MIN_QUOTE_FIELDS {
        return None;
    }

    let f = |i: usize| float_field(v[i]);
    let n = |i: usize| int_field(v[i]);
    let level = |price: usize| -> Option<PriceLevel> {
        Some(PriceLevel {
            price: f(price)?,
            volume: n(price + 1)?,
        })
    };

    let bids = (0..5)
        .map(|k| level(9 + 2 * k))
        .collect::<Option<Vec<_>>>()?;
    let asks = (0..5)
        .map(|k| level(19 + 2 * k))
        .collect::<Option<Vec<_>>>()?;

    Some(MarketSnapshot {
        name: v[1].to_string(),
        code: v[2].to_string(),
        current_price: f(3)?,
        prev_close: f(4)?,
        open: f(5)?,
        volume: n(6)?,
        bids,
        asks,
        quote_time: v[30].to_string(),
        change: f(31)?,
        change_percent: f(32)?,
        high: f(33)?,
        low: f(34)?,
        volume_hand: n(36)?,
        amount_10k: f(37)?,
        turnover_rate: f(38)?,
        pe_ratio: f(39)?,
        amplitude: f(43)?,
        circulating_market_value: f(44)?,
        total_market_value: f(45)?,
        pb_ratio: f(46)?,
        limit_up: f(47)?,
        limit_down: f(48)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::test_support::quote_line;

    fn source(base_url: &str) -> HttpQuoteSource {
        HttpQuoteSource::new(&QuoteConfig {
            base_url: base_url.to_string(),
            request_delay_ms: 0,
            timeout_seconds: 2,
        })
        .unwrap()
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    /// Serves a GBK quote line for `sh600000`, an unparseable body for
    /// `sz000002` and 404 for anything else.
    async fn feed() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request);
                    let path = head.split_whitespace().nth(1).unwrap_or_default();
                    let (status, body) = if path.ends_with("sh600000") {
                        let line = quote_line("600000", "浦发银行", 7.20);
                        ("200 OK", GBK.encode(&line).0.into_owned())
                    } else if path.ends_with("sz000002") {
                        ("200 OK", b"v_pv_none_match=\"1\";".to_vec())
                    } else {
                        ("404 Not Found", Vec::new())
                    };
                    let header = format!(
                        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(header.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}/q=")
    }

    #[tokio::test]
    async fn closed_port_batch_is_unreachable() {
        let quotes = source("http://127.0.0.1:1/q=");
        let err = quotes
            .get_quotes_batch(&codes(&["sh600000", "sz000001", "sh600036"]), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Unreachable { attempted: 3 }), "{err:?}");
    }

    #[tokio::test]
    async fn empty_batch_is_ok() {
        let quotes = source("http://127.0.0.1:1/q=");
        let out = quotes.get_quotes_batch(&[], Duration::ZERO).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn batch_pauses_between_requests() {
        let quotes = source("http://127.0.0.1:1/q=");
        let started = Instant::now();
        let _ = quotes
            .get_quotes_batch(&codes(&["sh600000", "sz000001", "sh600036"]), Duration::from_millis(40))
            .await;
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn partial_failures_keep_the_batch() {
        let quotes = source(&feed().await);
        let out = quotes
            .get_quotes_batch(&codes(&["sh600000", "sz000001", "sz000002"]), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["sh600000"].name, "浦发银行");
        assert_eq!(out["sh600000"].total_market_value, 2113.37);
    }

    #[tokio::test]
    async fn unparseable_quotes_are_absent_not_unreachable() {
        let quotes = source(&feed().await);
        assert!(quotes.get_quote("sz000002").await.unwrap().is_none());
        let out = quotes
            .get_quotes_batch(&codes(&["sz000002"]), Duration::ZERO)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(matches!(
            quotes.get_quote("sz000001").await,
            Err(DataError::Http(_))
        ));
    }

    #[test]
    fn parse_full_line() {
        let line = quote_line("600000", "浦发银行", 7.20);
        let snapshot = parse_quote_response(&line).unwrap();
        assert_eq!(snapshot.code, "600000");
        assert_eq!(snapshot.name, "浦发银行");
        assert_eq!(snapshot.current_price, 7.20);
        assert_eq!(snapshot.change_percent, 1.41);
        assert_eq!(snapshot.bids.len(), 5);
        assert_eq!(snapshot.asks.len(), 5);
        assert_eq!(snapshot.bids[0].price, 7.19);
        assert_eq!(snapshot.asks[0].price, 7.21);
        assert_eq!(snapshot.pb_ratio, 0.41);
        assert_eq!(snapshot.quote_time, "20240308150003");
    }

    #[test]
    fn empty_numeric_fields_read_as_zero() {
        let line = quote_line("600000", "浦发银行", 7.20).replace("~5.12~", "~~");
        let snapshot = parse_quote_response(&line).unwrap();
        assert_eq!(snapshot.pe_ratio, 0.0);
    }

    #[test]
    fn short_line_is_rejected() {
        assert!(parse_quote_response(r#"v_sh600000="1~浦发银行~600000~7.20";"#).is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_quote_response("").is_none());
        assert!(parse_quote_response("v_pv_none_match=\"1\";").is_none());
        let line = quote_line("600000", "浦发银行", 7.20).replace("~7.20~", "~abc~");
        assert!(parse_quote_response(&line).is_none());
    }

    #[test]
    fn gbk_body_decodes() {
        let line = quote_line("600000", "浦发银行", 7.20);
        let (bytes, _, _) = GBK.encode(&line);
        let (text, _, had_errors) = GBK.decode(&bytes);
        assert!(!had_errors);
        assert_eq!(parse_quote_response(&text).unwrap().name, "浦发银行");
    }
}
