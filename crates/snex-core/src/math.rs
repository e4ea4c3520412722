//! Small DSP helpers shared by nodes.
//!
//! - [`db_to_gain`] / [`gain_to_db`] - level conversions with a silence floor
//! - [`ms_to_samples`] - time conversion
//! - [`lerp`] - linear interpolation

use libm::{expf, logf};

/// Levels at or below this are treated as silence.
pub const SILENCE_DB: f32 = -100.0;

/// Convert decibels to linear gain.
///
/// Returns `0.0` at or below [`SILENCE_DB`].
///
/// ```rust
/// use snex_core::math::db_to_gain;
///
/// assert!((db_to_gain(0.0) - 1.0).abs() < 0.001);
/// assert!((db_to_gain(-6.02) - 0.5).abs() < 0.01);
/// assert_eq!(db_to_gain(-100.0), 0.0);
/// ```
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    if db <= SILENCE_DB {
        0.0
    } else {
        expf(db * FACTOR)
    }
}

/// Convert linear gain to decibels, clamped at [`SILENCE_DB`].
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    if gain <= 0.0 {
        SILENCE_DB
    } else {
        (logf(gain) * FACTOR).max(SILENCE_DB)
    }
}

/// Convert milliseconds to samples.
#[inline]
pub fn ms_to_samples(ms: f64, sample_rate: f64) -> f64 {
    ms * 0.001 * sample_rate
}

/// Linear interpolation between `a` and `b`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_round_trip() {
        for db in [-60.0f32, -12.0, 0.0, 6.0] {
            assert!((gain_to_db(db_to_gain(db)) - db).abs() < 1e-3);
        }
    }

    #[test]
    fn silence_floor() {
        assert_eq!(db_to_gain(-120.0), 0.0);
        assert_eq!(gain_to_db(0.0), SILENCE_DB);
    }

    #[test]
    fn time_conversion() {
        assert_eq!(ms_to_samples(10.0, 48000.0), 480.0);
    }
}
