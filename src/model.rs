use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candle timeframe supported by the application.
///
/// String representations match the config file format (e.g. `"1m"`, `"1h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "3m")]
    Min3,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl TimeFrame {
    /// Parse a config-format string into a `TimeFrame`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "3m" => Some(Self::Min3),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min3 => "3m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
        }
    }

    /// Return the Binance kline interval string for this timeframe.
    pub fn binance_interval(self) -> &'static str {
        // Binance uses the same notation as the config file.
        self.as_str()
    }

    /// Length of one candle.
    pub fn duration(self) -> chrono::Duration {
        match self {
            Self::Min1 => chrono::Duration::minutes(1),
            Self::Min3 => chrono::Duration::minutes(3),
            Self::Min5 => chrono::Duration::minutes(5),
            Self::Min15 => chrono::Duration::minutes(15),
            Self::Min30 => chrono::Duration::minutes(30),
            Self::Hour1 => chrono::Duration::hours(1),
            Self::Hour4 => chrono::Duration::hours(4),
            Self::Day1 => chrono::Duration::days(1),
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single observation of the analyzed price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl From<&Candle> for PricePoint {
    fn from(candle: &Candle) -> Self {
        Self {
            timestamp: candle.open_time,
            price: candle.close,
        }
    }
}

/// Project candles onto their close-price series, keeping input order.
pub fn close_series(candles: &[Candle]) -> Vec<PricePoint> {
    candles.iter().map(PricePoint::from).collect()
}

/// A persisted summary of one wave analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisRecord {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub strategy: String,
    pub label: String,
    pub current_price: Option<f64>,
    pub target_price: Option<f64>,
    pub analyzed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_round_trip() {
        let frames = [
            ("1m", TimeFrame::Min1),
            ("3m", TimeFrame::Min3),
            ("5m", TimeFrame::Min5),
            ("15m", TimeFrame::Min15),
            ("30m", TimeFrame::Min30),
            ("1h", TimeFrame::Hour1),
            ("4h", TimeFrame::Hour4),
            ("1d", TimeFrame::Day1),
        ];
        for (s, tf) in frames {
            assert_eq!(TimeFrame::from_str(s), Some(tf));
            assert_eq!(tf.as_str(), s);
        }
    }

    #[test]
    fn timeframe_serializes_as_config_string() {
        for tf in [TimeFrame::Min15, TimeFrame::Hour4, TimeFrame::Day1] {
            assert_eq!(serde_json::to_string(&tf).unwrap(), format!("\"{tf}\""));
        }
        let parsed: TimeFrame = serde_json::from_str("\"1h\"").unwrap();
        assert_eq!(parsed, TimeFrame::Hour1);
    }

    #[test]
    fn timeframe_invalid_string_returns_none() {
        assert_eq!(TimeFrame::from_str("2m"), None);
        assert_eq!(TimeFrame::from_str(""), None);
    }

    #[test]
    fn timeframe_duration_matches_interval() {
        assert_eq!(TimeFrame::Hour4.duration(), chrono::Duration::hours(4));
        assert_eq!(TimeFrame::Min15.duration(), chrono::Duration::minutes(15));
    }

    #[test]
    fn close_series_keeps_order_and_close_price() {
        let t = Utc::now();
        let candle = |offset: i64, close: f64| Candle {
            symbol: "BTCUSDT".into(),
            timeframe: TimeFrame::Hour1,
            open_time: t + chrono::Duration::hours(offset),
            open: 1.0,
            high: close + 1.0,
            low: 0.5,
            close,
            volume: 1.0,
        };
        let series = close_series(&[candle(0, 10.0), candle(1, 20.0)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].price, 10.0);
        assert_eq!(series[1].price, 20.0);
        assert!(series[0].timestamp < series[1].timestamp);
    }

    #[test]
    fn price_point_serde_round_trip() {
        let point = PricePoint {
            timestamp: Utc::now(),
            price: 42_000.5,
        };
        let json = serde_json::to_string(&point).unwrap();
        let parsed: PricePoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, point);
    }
}
