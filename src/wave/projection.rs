use crate::wave::WaveLabel;

/// Extension multiplier applied to the wave 1 move for a wave 3 target.
pub const WAVE3_EXTENSION: f64 = 1.618;
/// Wave 5 is projected as an equal-length repeat of the reference move.
pub const WAVE5_EXTENSION: f64 = 1.0;

/// Project a price target from the move `origin -> anchor`.
///
/// Returns `(base, target)`. For `Wave3` the move is extended by 1.618 from
/// the anchor, for `Wave5` it is repeated once. Any other label, or a missing
/// anchor, yields the no-op projection `(origin, origin)` so callers may pass
/// whatever label they classified without checking it first.
pub fn project_target(origin: f64, anchor: Option<f64>, wave: WaveLabel) -> (f64, f64) {
    let Some(anchor) = anchor else {
        return (origin, origin);
    };
    let multiplier = match wave {
        WaveLabel::Wave3 => WAVE3_EXTENSION,
        WaveLabel::Wave5 => WAVE5_EXTENSION,
        _ => return (origin, origin),
    };
    (anchor, anchor + multiplier * (anchor - origin))
}
