use serde::Serialize;

use crate::model::PricePoint;

/// Indices of strict local maxima and minima in a price series.
///
/// Both lists are increasing, disjoint and never contain the first or last
/// position of the series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtremumSet {
    pub peaks: Vec<usize>,
    pub troughs: Vec<usize>,
}

impl ExtremumSet {
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty() && self.troughs.is_empty()
    }
}

/// Find interior peaks and troughs by comparing each point to its two
/// immediate neighbors.
///
/// Comparisons are strict, so plateaus (equal neighbors) are neither peaks
/// nor troughs. A NaN price fails every comparison and is therefore skipped,
/// as are its neighbors' checks against it. Series shorter than three points
/// yield an empty set.
pub fn detect(prices: &[f64]) -> ExtremumSet {
    let mut extrema = ExtremumSet::default();
    for (offset, w) in prices.windows(3).enumerate() {
        let (prev, curr, next) = (w[0], w[1], w[2]);
        if curr > prev && curr > next {
            extrema.peaks.push(offset + 1);
        } else if curr < prev && curr < next {
            extrema.troughs.push(offset + 1);
        }
    }
    extrema
}

/// [`detect`] over the prices of a timestamped series.
pub fn detect_series(series: &[PricePoint]) -> ExtremumSet {
    let prices: Vec<f64> = series.iter().map(|p| p.price).collect();
    detect(&prices)
}
