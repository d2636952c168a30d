//! Micro-precision fixed-point helpers
//!
//! Everything stored in an artifact (scaler bounds, split thresholds, leaf
//! probabilities) is an `i64` scaled by [`SCALE`], so a pipeline hashes and
//! scores identically on every platform. Intermediate products go through
//! `i128`.

/// 1.0 == 1_000_000
pub const SCALE: i64 = 1_000_000;

/// Round an `f64` to the nearest micro unit, saturating at the `i64` bounds
#[inline]
pub fn to_fixed(value: f64) -> i64 {
    (value * SCALE as f64).round() as i64
}

#[inline]
pub fn to_f64(value: i64) -> f64 {
    value as f64 / SCALE as f64
}

/// `numerator * SCALE / denominator`, rounded half away from zero
///
/// Returns 0 when the denominator is 0.
pub fn ratio(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    let num = numerator as i128 * SCALE as i128;
    let den = denominator as i128;
    let half = den.abs() / 2;
    let rounded = if (num < 0) == (den < 0) {
        (num.abs() + half) / den.abs()
    } else {
        -((num.abs() + half) / den.abs())
    };
    clamp_i128(rounded)
}

/// Rounded integer mean of fixed-point values; `None` on an empty slice
pub fn mean(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let sum: i128 = values.iter().map(|&v| v as i128).sum();
    let n = values.len() as i128;
    let half = n / 2;
    let rounded = if sum >= 0 {
        (sum + half) / n
    } else {
        -((-sum + half) / n)
    };
    Some(clamp_i128(rounded))
}

fn clamp_i128(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
