pub mod extremum;
pub mod positional;
pub mod projection;
pub mod retracement;

use std::fmt;

use error_stack::{Report, bail};
use serde::Serialize;

use crate::config::{StrategyKind, WaveConfig};
use crate::error::WaveError;
use crate::wave::extremum::ExtremumSet;
use crate::wave::positional::Positional;
use crate::wave::retracement::Retracement;

/// Heuristic stage of an assumed five-wave price pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WaveLabel {
    Wave1,
    Wave3,
    Wave5,
    Unknown,
    InsufficientData,
}

impl WaveLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wave1 => "wave1",
            Self::Wave3 => "wave3",
            Self::Wave5 => "wave5",
            Self::Unknown => "unknown",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

impl fmt::Display for WaveLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaveTargets {
    pub current_price: f64,
    pub target_price: f64,
}

/// A retracement that exceeded its configured limit. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RuleViolation {
    Wave2Retracement { ratio: f64, limit: f64 },
    Wave4Retracement { ratio: f64, limit: f64 },
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wave2Retracement { ratio, limit } => write!(
                f,
                "wave 2 retracement {:.2}% exceeds {:.1}%",
                ratio * 100.0,
                limit * 100.0
            ),
            Self::Wave4Retracement { ratio, limit } => write!(
                f,
                "wave 4 retracement {:.2}% exceeds {:.1}%",
                ratio * 100.0,
                limit * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveClassification {
    pub label: WaveLabel,
    pub targets: Option<WaveTargets>,
    pub violations: Vec<RuleViolation>,
    /// Human-readable report lines, in evaluation order.
    pub notes: Vec<String>,
}

impl WaveClassification {
    pub fn labeled(label: WaveLabel) -> Self {
        Self {
            label,
            targets: None,
            violations: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn insufficient_data() -> Self {
        Self::labeled(WaveLabel::InsufficientData)
    }
}

/// A rule family that assigns a wave stage to a price series.
///
/// Implementations are pure: the same inputs always produce the same result
/// and neither input is modified.
pub trait WaveStrategy: Send + Sync {
    /// Unique name of this strategy (e.g., "positional").
    fn name(&self) -> &str;

    /// Classify `prices` given the extrema previously detected on it.
    ///
    /// Too few extrema is reported as [`WaveLabel::InsufficientData`], not as
    /// an error.
    fn classify(
        &self,
        prices: &[f64],
        extrema: &ExtremumSet,
    ) -> Result<WaveClassification, Report<WaveError>>;
}

/// Build the strategy selected in `config`.
pub fn build_strategy(config: &WaveConfig) -> Result<Box<dyn WaveStrategy>, Report<WaveError>> {
    match config.strategy {
        StrategyKind::Positional => Ok(Box::new(Positional)),
        StrategyKind::Retracement => Ok(Box::new(Retracement::new(
            config.wave2_max_retrace,
            config.wave4_max_retrace,
        )?)),
    }
}

/// Report the first non-finite price, if any.
///
/// The detector skips such values silently; callers use this to surface
/// them before analysis.
pub fn check_finite(prices: &[f64]) -> Result<(), Report<WaveError>> {
    if let Some(index) = prices.iter().position(|p| !p.is_finite()) {
        bail!(WaveError::InvalidSeries { index });
    }
    Ok(())
}

/// Look up the prices at the first `count` of `indices`.
///
/// Returns `None` if any of those indices is out of bounds. Indices past
/// `count` are neither read nor checked.
pub(crate) fn prices_at(prices: &[f64], indices: &[usize], count: usize) -> Option<Vec<f64>> {
    indices
        .iter()
        .take(count)
        .map(|&i| prices.get(i).copied())
        .collect()
}
