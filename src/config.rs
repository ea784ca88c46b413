use std::path::Path;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::TimeFrame;
use crate::wave::retracement::{DEFAULT_WAVE2_MAX_RETRACE, DEFAULT_WAVE4_MAX_RETRACE};

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_symbol() -> String {
    "BTCUSDT".into()
}

fn default_timeframe() -> String {
    "1h".into()
}

fn default_limit() -> usize {
    500
}

fn default_wave2_max_retrace() -> f64 {
    DEFAULT_WAVE2_MAX_RETRACE
}

fn default_wave4_max_retrace() -> f64 {
    DEFAULT_WAVE4_MAX_RETRACE
}

fn default_window() -> usize {
    200
}

fn default_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub wave: WaveConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Candles fetched per refresh when no range is configured.
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl MarketConfig {
    /// Parsed timeframe; `validate` guarantees this succeeds for loaded configs.
    pub fn timeframe(&self) -> Option<TimeFrame> {
        TimeFrame::from_str(&self.timeframe)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            timeframe: default_timeframe(),
            limit: default_limit(),
            start_time: None,
            end_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Positional,
    Retracement,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaveConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Earlier revisions used 0.8 here; 0.618 is the default.
    #[serde(default = "default_wave2_max_retrace")]
    pub wave2_max_retrace: f64,
    #[serde(default = "default_wave4_max_retrace")]
    pub wave4_max_retrace: f64,
    /// Number of most recent candles analyzed.
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            wave2_max_retrace: default_wave2_max_retrace(),
            wave4_max_retrace: default_wave4_max_retrace(),
            window: default_window(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_log_format(config)?;
    validate_market(config)?;
    validate_wave(config)?;
    validate_watch(config)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_log_format(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            config.general.log_format
        )));
    }
    Ok(())
}

fn validate_market(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let market = &config.market;
    if market.symbol.is_empty() {
        return Err(invalid("market.symbol must not be empty".into()));
    }
    if market.timeframe().is_none() {
        return Err(invalid(format!(
            "market.timeframe: unknown timeframe \"{}\"",
            market.timeframe
        )));
    }
    if market.limit == 0 {
        return Err(invalid("market.limit must be > 0".into()));
    }
    if let (Some(start), Some(end)) = (market.start_time, market.end_time) {
        if start >= end {
            return Err(invalid(format!(
                "market.start_time ({start}) must be before market.end_time ({end})"
            )));
        }
    }
    Ok(())
}

fn validate_wave(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let wave = &config.wave;
    for (name, value) in [
        ("wave2_max_retrace", wave.wave2_max_retrace),
        ("wave4_max_retrace", wave.wave4_max_retrace),
    ] {
        if value.is_nan() || value <= 0.0 {
            return Err(invalid(format!("wave.{name} must be > 0, got {value}")));
        }
    }
    // Three points is the minimum for any extremum to exist.
    if wave.window < 3 {
        return Err(invalid(format!(
            "wave.window must be >= 3, got {}",
            wave.window
        )));
    }
    Ok(())
}

fn validate_watch(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.watch.interval_secs == 0 {
        return Err(invalid("watch.interval_secs must be > 0".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
data_dir = "/tmp/data"

[market]
symbol = "ETHUSDT"
timeframe = "4h"
limit = 1000
start_time = "2022-08-01T00:00:00Z"
end_time = "2025-06-14T00:00:00Z"

[wave]
strategy = "retracement"
wave2_max_retrace = 0.8
wave4_max_retrace = 0.5
window = 300

[watch]
interval_secs = 60
"#;
        let config = parse(toml);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.market.symbol, "ETHUSDT");
        assert_eq!(config.market.timeframe(), Some(TimeFrame::Hour4));
        assert!(config.market.start_time.is_some());
        assert_eq!(config.wave.strategy, StrategyKind::Retracement);
        assert_eq!(config.wave.wave2_max_retrace, 0.8);
        assert_eq!(config.watch.interval_secs, 60);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let toml = r#"
[general]
"#;
        let config = parse(toml);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.data_dir, "./data");
        assert_eq!(config.market.symbol, "BTCUSDT");
        assert_eq!(config.market.timeframe(), Some(TimeFrame::Hour1));
        assert_eq!(config.market.limit, 500);
        assert_eq!(config.wave.strategy, StrategyKind::Positional);
        assert_eq!(config.wave.wave2_max_retrace, 0.618);
        assert_eq!(config.wave.wave4_max_retrace, 0.382);
        assert_eq!(config.wave.window, 200);
        assert_eq!(config.watch.interval_secs, 3600);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unknown_strategy_fails_to_parse() {
        let toml = r#"
[general]

[wave]
strategy = "fibonacci"
"#;
        assert!(toml::from_str::<AppConfig>(toml).is_err());
    }

    #[test]
    fn invalid_timeframe_string_rejected() {
        let toml = r#"
[general]

[market]
timeframe = "2m"
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn inverted_range_rejected() {
        let toml = r#"
[general]

[market]
start_time = "2025-01-01T00:00:00Z"
end_time = "2024-01-01T00:00:00Z"
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn non_positive_threshold_rejected() {
        let toml = r#"
[general]

[wave]
wave4_max_retrace = 0.0
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn tiny_window_rejected() {
        let toml = r#"
[general]

[wave]
window = 2
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn unknown_log_format_rejected() {
        let toml = r#"
[general]
log_format = "xml"
"#;
        assert!(validate(&parse(toml)).is_err());
    }
}
