//! Degree-based angle helpers.
//!
//! Two conventions are in play: signed headings in `-180..=180` as reported by
//! the simulator, and unsigned bearings in `0..360` which can be averaged.

use serde::{Deserialize, Serialize};

/// Maps any angle into `0..360`.
pub fn to_unsigned(angle: f64) -> f64 {
    angle.rem_euclid(360.0)
}

/// Maps an unsigned bearing back into the signed convention.
pub fn to_signed(angle: f64) -> f64 {
    if angle > 180.0 {
        angle - 360.0
    } else {
        angle
    }
}

/// Magnitude of the shortest rotation between two headings, in `[0, 180]`.
pub fn direction_diff(heading: f64, best_heading: f64) -> f64 {
    (((best_heading - heading) + 180.0).rem_euclid(360.0) - 180.0).abs()
}

/// How a set of unsigned bearings is reduced to one.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AngleMean {
    /// Plain arithmetic mean of the 0..360 values. Reproduces historical
    /// reference tables exactly but points the wrong way when the bearings
    /// straddle 0°/360° (350° and 10° average to 180°).
    Naive,
    /// Bearings are first unwrapped to within 180° of the first one, averaged,
    /// then wrapped back. Identical to `Naive` unless the set straddles 0°.
    #[default]
    Unwrapped,
}

impl AngleMean {
    fn prepare(&self, bearings: &[f64]) -> Vec<f64> {
        match self {
            AngleMean::Naive => bearings.to_vec(),
            AngleMean::Unwrapped => unwrap_bearings(bearings),
        }
    }

    fn finish(&self, mean: f64) -> f64 {
        match self {
            AngleMean::Naive => mean,
            AngleMean::Unwrapped => to_unsigned(mean),
        }
    }
}

/// Shifts each bearing by a full turn where it sits more than 180° away from
/// the first one. Values already close are returned untouched.
fn unwrap_bearings(bearings: &[f64]) -> Vec<f64> {
    let Some(&first) = bearings.first() else {
        return Vec::new();
    };
    bearings
        .iter()
        .map(|&a| {
            let d = a - first;
            if d > 180.0 {
                a - 360.0
            } else if d < -180.0 {
                a + 360.0
            } else {
                a
            }
        })
        .collect()
}

/// Unweighted mean of unsigned bearings, `None` for an empty set.
pub fn average(bearings: &[f64], mean: AngleMean) -> Option<f64> {
    if bearings.is_empty() {
        return None;
    }
    let values = mean.prepare(bearings);
    let m = values.iter().sum::<f64>() / values.len() as f64;
    Some(mean.finish(m))
}

/// Weighted mean where the bearing at position `k` gets weight `k^power`
/// normalised over the set, so later bearings dominate and the first one
/// counts for nothing. Falls back to [`average`] when all weights are zero.
pub fn weighted_average(bearings: &[f64], power: f64, mean: AngleMean) -> Option<f64> {
    if bearings.is_empty() {
        return None;
    }
    let powers: Vec<f64> = (0..bearings.len()).map(|k| index_weight(k, power)).collect();
    let total: f64 = powers.iter().sum();
    if total == 0.0 {
        return average(bearings, mean);
    }
    let values = mean.prepare(bearings);
    let m = values
        .iter()
        .zip(&powers)
        .map(|(a, p)| a * (p / total))
        .sum::<f64>();
    Some(mean.finish(m))
}

fn index_weight(k: usize, power: f64) -> f64 {
    let k = k as f64;
    if power.fract() == 0.0 && power.abs() <= i32::MAX as f64 {
        k.powi(power as i32)
    } else {
        k.powf(power)
    }
}
