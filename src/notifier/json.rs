use crate::analysis::AnalysisReport;
use crate::notifier::Notifier;

/// Prints each analysis as one JSON object per line.
pub struct JsonNotifier;

impl Notifier for JsonNotifier {
    fn notify(&self, report: &AnalysisReport) {
        match serde_json::to_string(report) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                tracing::warn!(error = %e, symbol = %report.symbol, "failed to serialize report")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeFrame;
    use crate::wave::extremum::ExtremumSet;
    use crate::wave::{RuleViolation, WaveClassification, WaveLabel};

    #[test]
    fn report_serializes_classification() {
        let mut classification = WaveClassification::labeled(WaveLabel::Wave5);
        classification.violations.push(RuleViolation::Wave4Retracement {
            ratio: 0.5,
            limit: 0.382,
        });
        let report = AnalysisReport {
            symbol: "BTCUSDT".into(),
            timeframe: TimeFrame::Hour4,
            strategy: "retracement".into(),
            points: 8,
            first_time: None,
            last_time: None,
            extrema: ExtremumSet::default(),
            classification,
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["timeframe"], "4h");
        assert_eq!(value["classification"]["label"], "Wave5");
        assert_eq!(
            value["classification"]["violations"][0]["Wave4Retracement"]["ratio"],
            0.5
        );
        assert!(value["classification"]["targets"].is_null());

        JsonNotifier.notify(&report);
    }
}
