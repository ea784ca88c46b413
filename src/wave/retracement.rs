use error_stack::{Report, bail};
use tracing::debug;

use crate::error::WaveError;
use crate::wave::extremum::ExtremumSet;
use crate::wave::projection::{WAVE3_EXTENSION, project_target};
use crate::wave::{
    RuleViolation, WaveClassification, WaveLabel, WaveStrategy, WaveTargets, prices_at,
};

pub const DEFAULT_WAVE2_MAX_RETRACE: f64 = 0.618;
pub const DEFAULT_WAVE4_MAX_RETRACE: f64 = 0.382;

/// Validates a wave count by measuring corrections against the wave 1 move.
///
/// Wave 1 runs from the first trough to the second peak. Wave 2 and wave 4
/// retracements are expressed as a fraction of that length and flagged when
/// they exceed their limits; flags are advisory and never stop the
/// classification.
pub struct Retracement {
    wave2_max_retrace: f64,
    wave4_max_retrace: f64,
}

impl Retracement {
    pub fn new(wave2_max_retrace: f64, wave4_max_retrace: f64) -> Result<Self, Report<WaveError>> {
        if wave2_max_retrace.is_nan() || wave2_max_retrace <= 0.0 {
            bail!(WaveError::InvalidParameter {
                name: "wave2_max_retrace must be > 0".into(),
            });
        }
        if wave4_max_retrace.is_nan() || wave4_max_retrace <= 0.0 {
            bail!(WaveError::InvalidParameter {
                name: "wave4_max_retrace must be > 0".into(),
            });
        }
        Ok(Self {
            wave2_max_retrace,
            wave4_max_retrace,
        })
    }
}

impl Default for Retracement {
    fn default() -> Self {
        Self {
            wave2_max_retrace: DEFAULT_WAVE2_MAX_RETRACE,
            wave4_max_retrace: DEFAULT_WAVE4_MAX_RETRACE,
        }
    }
}

impl WaveStrategy for Retracement {
    fn name(&self) -> &str {
        "retracement"
    }

    fn classify(
        &self,
        prices: &[f64],
        extrema: &ExtremumSet,
    ) -> Result<WaveClassification, Report<WaveError>> {
        if extrema.peaks.len() < 2 || extrema.troughs.len() < 2 {
            return Ok(WaveClassification::insufficient_data());
        }
        let (Some(peaks), Some(troughs), Some(&current_price)) = (
            prices_at(prices, &extrema.peaks, 3),
            prices_at(prices, &extrema.troughs, 3),
            prices.last(),
        ) else {
            return Ok(WaveClassification::insufficient_data());
        };

        let wave1_length = peaks[1] - troughs[0];
        if wave1_length == 0.0 || !wave1_length.is_finite() {
            return Err(Report::new(WaveError::DegenerateInput {
                reason: format!("wave 1 length is {wave1_length}"),
            })
            .attach(format!(
                "trough[0] = {}, peak[1] = {}",
                troughs[0], peaks[1]
            )));
        }

        let mut violations = Vec::new();
        let mut notes = vec![format!("wave 1 length: {wave1_length:.4}")];

        let wave2_retrace = (peaks[1] - troughs[1]) / wave1_length;
        notes.push(format!("wave 2 retracement: {:.2}%", wave2_retrace * 100.0));
        if wave2_retrace > self.wave2_max_retrace {
            violations.push(RuleViolation::Wave2Retracement {
                ratio: wave2_retrace,
                limit: self.wave2_max_retrace,
            });
        }

        let (_, wave3_target) = project_target(troughs[0], Some(peaks[1]), WaveLabel::Wave3);
        notes.push(format!(
            "wave 3 target: {wave3_target:.4} ({WAVE3_EXTENSION} x wave 1)"
        ));

        let mut label = WaveLabel::Wave3;
        if peaks.len() > 2 && troughs.len() > 2 {
            let wave4_retrace = (peaks[2] - troughs[2]) / wave1_length;
            notes.push(format!("wave 4 retracement: {:.2}%", wave4_retrace * 100.0));
            if wave4_retrace > self.wave4_max_retrace {
                violations.push(RuleViolation::Wave4Retracement {
                    ratio: wave4_retrace,
                    limit: self.wave4_max_retrace,
                });
            }
            label = WaveLabel::Wave5;
        }

        notes.extend(violations.iter().map(|v| format!("warning: {v}")));
        debug!(
            label = %label,
            wave1_length,
            wave2_retrace,
            violations = violations.len(),
            "retracement rules evaluated"
        );

        Ok(WaveClassification {
            label,
            targets: Some(WaveTargets {
                current_price,
                target_price: wave3_target,
            }),
            violations,
            notes,
        })
    }
}
