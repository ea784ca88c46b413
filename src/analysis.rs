use chrono::{DateTime, Utc};
use error_stack::Report;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::WaveError;
use crate::model::{AnalysisRecord, Candle, TimeFrame, close_series};
use crate::wave::extremum::{ExtremumSet, detect_series};
use crate::wave::{WaveClassification, WaveStrategy, check_finite};

/// Everything the presentation layer needs about one analysis pass.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub strategy: String,
    pub points: usize,
    pub first_time: Option<DateTime<Utc>>,
    pub last_time: Option<DateTime<Utc>>,
    pub extrema: ExtremumSet,
    pub classification: WaveClassification,
}

impl AnalysisReport {
    pub fn to_record(&self, analyzed_at: DateTime<Utc>) -> AnalysisRecord {
        let targets = self.classification.targets;
        AnalysisRecord {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            strategy: self.strategy.clone(),
            label: self.classification.label.to_string(),
            current_price: targets.map(|t| t.current_price),
            target_price: targets.map(|t| t.target_price),
            analyzed_at,
        }
    }
}

/// Detect extrema on the close prices of `candles` and classify them.
///
/// Candles must be in ascending chronological order (oldest first).
/// Non-finite prices are logged and left to the detector, which skips them.
pub fn analyze(
    symbol: &str,
    timeframe: TimeFrame,
    candles: &[Candle],
    strategy: &dyn WaveStrategy,
) -> Result<AnalysisReport, Report<WaveError>> {
    let series = close_series(candles);
    let prices: Vec<f64> = series.iter().map(|p| p.price).collect();

    if let Err(report) = check_finite(&prices) {
        warn!(symbol, error = %report, "series contains non-finite prices; they are ignored");
    }

    let extrema = detect_series(&series);
    if extrema.is_empty() {
        debug!(symbol, points = prices.len(), "no local extrema in series");
    }
    debug!(
        symbol,
        points = prices.len(),
        peaks = extrema.peaks.len(),
        troughs = extrema.troughs.len(),
        "extrema detected"
    );

    let classification = strategy.classify(&prices, &extrema)?;

    Ok(AnalysisReport {
        symbol: symbol.to_owned(),
        timeframe,
        strategy: strategy.name().to_owned(),
        points: series.len(),
        first_time: series.first().map(|p| p.timestamp),
        last_time: series.last().map(|p| p.timestamp),
        extrema,
        classification,
    })
}
