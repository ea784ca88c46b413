use error_stack::Report;
use tracing::debug;

use crate::error::WaveError;
use crate::wave::extremum::ExtremumSet;
use crate::wave::projection::project_target;
use crate::wave::{WaveClassification, WaveLabel, WaveStrategy, WaveTargets, prices_at};

/// Classifies by comparing the prices of the first few peaks and troughs.
///
/// Rules are checked in a fixed order and the first match wins:
///
/// 1. `peak0 > trough0 && trough0 < peak1` → `Wave1`
/// 2. `peak1 > trough1 && peak1 > peak0` → `Wave3`
/// 3. `peak2 > peak1 > peak0` → `Wave5`
/// 4. otherwise `Unknown`
///
/// The rules overlap, so reordering them changes results.
pub struct Positional;

impl WaveStrategy for Positional {
    fn name(&self) -> &str {
        "positional"
    }

    fn classify(
        &self,
        prices: &[f64],
        extrema: &ExtremumSet,
    ) -> Result<WaveClassification, Report<WaveError>> {
        if extrema.peaks.len() < 2 || extrema.troughs.len() < 2 {
            return Ok(WaveClassification::insufficient_data());
        }
        let (Some(peaks), Some(troughs)) = (
            prices_at(prices, &extrema.peaks, 3),
            prices_at(prices, &extrema.troughs, 2),
        ) else {
            return Ok(WaveClassification::insufficient_data());
        };

        let label = label_for(&peaks, &troughs);
        debug!(
            label = %label,
            peaks = peaks.len(),
            troughs = troughs.len(),
            "positional rules evaluated"
        );

        let mut classification = WaveClassification::labeled(label);
        if let (WaveLabel::Wave3 | WaveLabel::Wave5, Some(&current_price)) =
            (label, prices.last())
        {
            let (_, target_price) = project_target(troughs[0], Some(peaks[1]), label);
            classification.targets = Some(WaveTargets {
                current_price,
                target_price,
            });
        }
        Ok(classification)
    }
}

fn label_for(peaks: &[f64], troughs: &[f64]) -> WaveLabel {
    if peaks[0] > troughs[0] && troughs[0] < peaks[1] {
        WaveLabel::Wave1
    } else if peaks[1] > troughs[1] && peaks[1] > peaks[0] {
        WaveLabel::Wave3
    } else if peaks.len() > 2 && peaks[2] > peaks[1] && peaks[1] > peaks[0] {
        WaveLabel::Wave5
    } else {
        WaveLabel::Unknown
    }
}
