use std::sync::Arc;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::model::{Candle, TimeFrame};

const BINANCE_BASE_URL: &str = "https://api.binance.com";
const MAX_CANDLES_PER_REQUEST: usize = 1000;

pub struct BinanceExchange {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl BinanceExchange {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        // Binance kline endpoint costs weight 2; limit ~2500 req/min (5000 weight/min)
        // = ~40 req/s. Use 20 for safety margin.
        let quota = Quota::per_second(nonzero!(20u32));
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, Report<ExchangeError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let url = format!("{}/api/v3/klines", self.base_url);
        let mut params = vec![
            ("symbol", symbol.to_owned()),
            ("interval", timeframe.binance_interval().to_owned()),
            ("limit", limit.min(MAX_CANDLES_PER_REQUEST).to_string()),
        ];
        if let Some(start) = start_time {
            params.push(("startTime", start.timestamp_millis().to_string()));
        }
        if let Some(end) = end_time {
            // endTime is inclusive on Binance; the range contract is half-open
            params.push(("endTime", (end.timestamp_millis() - 1).to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .change_context(ExchangeError::Request {
                exchange: "binance".into(),
            })?;

        if !response.status().is_success() {
            return Err(Report::new(ExchangeError::Request {
                exchange: "binance".into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        let raw: Vec<BinanceKlineRow> =
            response
                .json()
                .await
                .change_context(ExchangeError::ResponseParse {
                    exchange: "binance".into(),
                })?;

        debug!(symbol, timeframe = %timeframe, fetched = raw.len(), "binance page fetched");

        raw.into_iter()
            .map(|row| row.into_candle(symbol, timeframe))
            .collect()
    }
}

impl Default for BinanceExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Exchange for BinanceExchange {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            // Pages walk backwards from now; each request ends before the oldest candle seen.
            let mut pages: Vec<Vec<Candle>> = Vec::new();
            let mut remaining = limit;
            let mut end_time: Option<DateTime<Utc>> = None;

            while remaining > 0 {
                let requested = remaining.min(MAX_CANDLES_PER_REQUEST);
                let page = self
                    .fetch_page(&symbol, timeframe, requested, None, end_time)
                    .await?;

                let fetched = page.len();
                let Some(first_open) = page.first().map(|c| c.open_time) else {
                    break;
                };
                pages.push(page);
                remaining = remaining.saturating_sub(fetched);

                if fetched < requested {
                    break;
                }
                end_time = Some(first_open);
            }

            let candles: Vec<Candle> = pages.into_iter().rev().flatten().collect();

            info!(
                symbol = %symbol,
                timeframe = %timeframe,
                fetched = candles.len(),
                "binance candle fetch complete"
            );

            Ok(candles)
        })
    }

    fn fetch_candles_in_range(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let mut all_candles: Vec<Candle> = Vec::new();
            let mut cursor = start_time;

            while cursor < end_time {
                let page = self
                    .fetch_page(
                        &symbol,
                        timeframe,
                        MAX_CANDLES_PER_REQUEST,
                        Some(cursor),
                        Some(end_time),
                    )
                    .await?;

                let fetched = page.len();
                let Some(last_open) = page.last().map(|c| c.open_time) else {
                    break;
                };
                all_candles.extend(page);

                if fetched < MAX_CANDLES_PER_REQUEST {
                    break;
                }
                cursor = next_cursor(last_open, timeframe);

                info!(
                    symbol = %symbol,
                    timeframe = %timeframe,
                    fetched = all_candles.len(),
                    "binance candle fetch progress"
                );
            }

            Ok(all_candles)
        })
    }
}

/// Start of the page following a page whose newest candle opened at `last_open`.
fn next_cursor(last_open: DateTime<Utc>, timeframe: TimeFrame) -> DateTime<Utc> {
    last_open + timeframe.duration()
}

/// Binance kline REST response row.
/// Format: [open_time, open, high, low, close, volume, close_time, ...]
#[derive(Debug, Deserialize)]
struct BinanceKlineRow(
    i64,                        // 0: open_time (ms)
    String,                     // 1: open
    String,                     // 2: high
    String,                     // 3: low
    String,                     // 4: close
    String,                     // 5: volume
    #[allow(dead_code)] i64,    // 6: close_time
    #[allow(dead_code)] String, // 7: quote asset volume
    #[allow(dead_code)] i64,    // 8: number of trades
    #[allow(dead_code)] String, // 9: taker buy base volume
    #[allow(dead_code)] String, // 10: taker buy quote volume
    #[allow(dead_code)] String, // 11: ignore
);

impl BinanceKlineRow {
    fn into_candle(
        self,
        symbol: &str,
        timeframe: TimeFrame,
    ) -> Result<Candle, Report<ExchangeError>> {
        let parse_f64 = |s: &str| -> Result<f64, Report<ExchangeError>> {
            s.parse::<f64>()
                .change_context(ExchangeError::ResponseParse {
                    exchange: "binance".into(),
                })
                .attach_with(|| format!("value: {s:?}"))
        };

        let open_time = DateTime::from_timestamp_millis(self.0).ok_or_else(|| {
            Report::new(ExchangeError::ResponseParse {
                exchange: "binance".into(),
            })
            .attach(format!("open_time out of range: {}", self.0))
        })?;

        Ok(Candle {
            symbol: symbol.to_owned(),
            timeframe,
            open_time,
            open: parse_f64(&self.1)?,
            high: parse_f64(&self.2)?,
            low: parse_f64(&self.3)?,
            close: parse_f64(&self.4)?,
            volume: parse_f64(&self.5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(close: &str) -> BinanceKlineRow {
        BinanceKlineRow(
            1704067200000,
            "42000.0".into(),
            "43000.0".into(),
            "41500.0".into(),
            close.into(),
            "100.5".into(),
            1704070799999,
            "0".into(),
            10,
            "0".into(),
            "0".into(),
            "0".into(),
        )
    }

    #[test]
    fn binance_kline_row_parses_into_candle() {
        let candle = row("42500.0").into_candle("BTCUSDT", TimeFrame::Hour1).unwrap();
        assert_eq!(candle.symbol, "BTCUSDT");
        assert_eq!(candle.timeframe, TimeFrame::Hour1);
        assert_eq!(candle.open_time.timestamp_millis(), 1704067200000);
        assert_eq!(candle.open, 42000.0);
        assert_eq!(candle.close, 42500.0);
        assert_eq!(candle.volume, 100.5);
    }

    #[test]
    fn malformed_price_is_parse_error() {
        let err = row("not-a-number")
            .into_candle("BTCUSDT", TimeFrame::Hour1)
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ExchangeError::ResponseParse { .. }
        ));
    }

    #[test]
    fn kline_row_deserializes_from_json_array() {
        let json = r#"[[1704067200000,"1.0","2.0","0.5","1.5","10.0",1704070799999,"15.0",3,"5.0","7.5","0"]]"#;
        let rows: Vec<BinanceKlineRow> = serde_json::from_str(json).unwrap();
        assert_eq!(rows.len(), 1);
        let candle = rows
            .into_iter()
            .next()
            .unwrap()
            .into_candle("ETHUSDT", TimeFrame::Hour1)
            .unwrap();
        assert_eq!(candle.close, 1.5);
    }

    #[test]
    fn next_cursor_advances_one_candle() {
        let t = DateTime::from_timestamp_millis(1704067200000).unwrap();
        assert_eq!(next_cursor(t, TimeFrame::Hour1), t + chrono::Duration::hours(1));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let exchange = BinanceExchange::with_base_url("http://localhost:8080/");
        assert_eq!(exchange.base_url, "http://localhost:8080");
    }

    const HISTORY_START_MS: i64 = 1_704_067_200_000;
    const HOUR_MS: i64 = 3_600_000;

    /// Answers `/api/v3/klines` from an hourly history of `history` candles,
    /// following Binance's startTime/endTime/limit selection.
    async fn serve_klines(history: i64) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let request = String::from_utf8_lossy(&buf).into_owned();
                let body = klines_body(&request, history);
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{addr}")
    }

    fn klines_body(request: &str, history: i64) -> String {
        let target = request.split_whitespace().nth(1).unwrap_or_default();
        let query = target.split_once('?').map(|(_, q)| q).unwrap_or_default();
        let param = |name: &str| {
            query
                .split('&')
                .filter_map(|kv| kv.split_once('='))
                .find(|(k, _)| *k == name)
                .and_then(|(_, v)| v.parse::<i64>().ok())
        };

        let limit = param("limit").unwrap_or(500);
        let last_index = param("endTime")
            .map(|end| (end - HISTORY_START_MS).div_euclid(HOUR_MS))
            .unwrap_or(history - 1)
            .min(history - 1);
        let (first, last) = match param("startTime") {
            Some(start) => {
                let first = (start - HISTORY_START_MS + HOUR_MS - 1).div_euclid(HOUR_MS).max(0);
                (first, last_index.min(first + limit - 1))
            }
            None => ((last_index - limit + 1).max(0), last_index),
        };

        let rows: Vec<String> = (first..=last)
            .map(|i| {
                let open = HISTORY_START_MS + i * HOUR_MS;
                format!(
                    r#"[{open},"1.0","2.0","0.5","{i}.0","10.0",{},"0",1,"0","0","0"]"#,
                    open + HOUR_MS - 1
                )
            })
            .collect();
        format!("[{}]", rows.join(","))
    }

    fn assert_contiguous(candles: &[Candle]) {
        assert!(
            candles
                .windows(2)
                .all(|w| w[1].open_time - w[0].open_time == chrono::Duration::hours(1))
        );
    }

    #[tokio::test]
    async fn fetch_candles_pages_past_request_cap() {
        let exchange = BinanceExchange::with_base_url(&serve_klines(3000).await);
        let candles = exchange
            .fetch_candles("BTCUSDT", TimeFrame::Hour1, 2500)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2500);
        assert_contiguous(&candles);
        // newest 2500 of 3000: indices 500..=2999
        assert_eq!(candles[0].close, 500.0);
        assert_eq!(candles[2499].close, 2999.0);
    }

    #[tokio::test]
    async fn fetch_candles_stops_when_history_runs_out() {
        let exchange = BinanceExchange::with_base_url(&serve_klines(1500).await);
        let candles = exchange
            .fetch_candles("BTCUSDT", TimeFrame::Hour1, 5000)
            .await
            .unwrap();

        assert_eq!(candles.len(), 1500);
        assert_contiguous(&candles);
        assert_eq!(candles[0].close, 0.0);
    }

    #[tokio::test]
    async fn fetch_candles_within_cap_is_single_page() {
        let exchange = BinanceExchange::with_base_url(&serve_klines(3000).await);
        let candles = exchange
            .fetch_candles("BTCUSDT", TimeFrame::Hour1, 10)
            .await
            .unwrap();

        assert_eq!(candles.len(), 10);
        assert_eq!(candles[9].close, 2999.0);
    }

    #[tokio::test]
    async fn fetch_range_is_half_open_across_pages() {
        let exchange = BinanceExchange::with_base_url(&serve_klines(3000).await);
        let start = DateTime::from_timestamp_millis(HISTORY_START_MS).unwrap();
        let end = start + chrono::Duration::hours(1500);
        let candles = exchange
            .fetch_candles_in_range("BTCUSDT", TimeFrame::Hour1, start, end)
            .await
            .unwrap();

        assert_eq!(candles.len(), 1500);
        assert_contiguous(&candles);
        assert_eq!(candles[0].open_time, start);
        assert_eq!(candles[1499].open_time, end - chrono::Duration::hours(1));
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_candles() {
        let exchange = BinanceExchange::new();
        let candles = exchange
            .fetch_candles("BTCUSDT", TimeFrame::Hour1, 10)
            .await
            .unwrap();
        assert!(!candles.is_empty());
        assert!(candles.len() <= 10);
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_range_paginates() {
        let exchange = BinanceExchange::new();
        let end = Utc::now();
        let start = end - chrono::Duration::hours(1500);
        let candles = exchange
            .fetch_candles_in_range("BTCUSDT", TimeFrame::Hour1, start, end)
            .await
            .unwrap();
        assert!(candles.len() > MAX_CANDLES_PER_REQUEST);
        assert!(candles.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }
}
