//! Parameter ranges.
//!
//! A [`ParameterRange`] maps between a parameter's plain value and the
//! normalised 0..1 space used by modulation sources and connections. The
//! skew factor bends the curve: `skew < 1` gives more resolution at the low
//! end (frequencies), `skew > 1` at the high end.
//!
//! # Normalisation
//!
//! - `normalised = ((value - min) / (max - min))^skew`
//! - `value = min + normalised^(1 / skew) * (max - min)`, snapped to `step`

use serde::{Deserialize, Serialize};

/// Range, step size and skew of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterRange {
    /// Lowest value.
    pub min: f64,
    /// Highest value.
    pub max: f64,
    /// Step size, `0` for continuous.
    pub step: f64,
    /// Skew factor, `1` for linear.
    pub skew: f64,
}

impl Default for ParameterRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            step: 0.0,
            skew: 1.0,
        }
    }
}

impl ParameterRange {
    /// A linear continuous range.
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            step: 0.0,
            skew: 1.0,
        }
    }

    /// Returns a copy with a step size.
    pub const fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Returns a copy with a skew factor.
    pub const fn with_skew(mut self, skew: f64) -> Self {
        self.skew = skew;
        self
    }

    /// Returns a copy whose skew puts `centre` at the middle position.
    pub fn with_centre_skew(self, centre: f64) -> Self {
        let proportion = (centre - self.min) / (self.max - self.min);
        if proportion <= 0.0 || proportion >= 1.0 {
            return self;
        }
        self.with_skew(libm::log(0.5) / libm::log(proportion))
    }

    /// A decibel range from `min_db` to `max_db`, centred at -6 dB.
    pub fn decibels(min_db: f64, max_db: f64) -> Self {
        Self::new(min_db, max_db).with_step(0.1).with_centre_skew(-6.0)
    }

    /// Whether `min == 0`, `max == 1` and the curve is linear.
    pub fn is_identity(&self) -> bool {
        self.min == 0.0 && self.max == 1.0 && self.skew == 1.0 && self.step == 0.0
    }

    /// Clamps `value` into the range.
    pub fn clamp(&self, value: f64) -> f64 {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        value.clamp(lo, hi)
    }

    /// Rounds `value` to the nearest step.
    pub fn snap(&self, value: f64) -> f64 {
        if self.step > 0.0 {
            self.min + libm::round((value - self.min) / self.step) * self.step
        } else {
            value
        }
    }

    /// Plain value to 0..1.
    pub fn normalize(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range == 0.0 {
            return 0.0;
        }
        let linear = ((self.clamp(value) - self.min) / range).clamp(0.0, 1.0);
        if self.skew == 1.0 || linear == 0.0 {
            linear
        } else {
            libm::pow(linear, self.skew)
        }
    }

    /// 0..1 to plain value, snapped to the step size.
    pub fn denormalize(&self, normalized: f64) -> f64 {
        let n = normalized.clamp(0.0, 1.0);
        let curved = if self.skew == 1.0 || n == 0.0 || self.skew <= 0.0 {
            n
        } else {
            libm::pow(n, 1.0 / self.skew)
        };
        self.clamp(self.snap(self.min + curved * (self.max - self.min)))
    }

    /// Converts a value of `source` into this range through the normalised
    /// position.
    pub fn convert_from(&self, source: &ParameterRange, value: f64) -> f64 {
        self.denormalize(source.normalize(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_range() {
        let r = ParameterRange::new(20.0, 120.0);
        assert_eq!(r.normalize(70.0), 0.5);
        assert_eq!(r.denormalize(0.5), 70.0);
        assert_eq!(r.normalize(500.0), 1.0);
    }

    #[test]
    fn step_snaps() {
        let r = ParameterRange::new(0.0, 10.0).with_step(1.0);
        assert_eq!(r.denormalize(0.44), 4.0);
        assert_eq!(r.denormalize(0.46), 5.0);
    }

    #[test]
    fn centre_skew_maps_half_to_centre() {
        let r = ParameterRange::new(20.0, 20000.0).with_centre_skew(1000.0);
        assert!((r.denormalize(0.5) - 1000.0).abs() < 1e-6);
        assert!((r.normalize(1000.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn conversion_between_ranges() {
        let source = ParameterRange::default();
        let target = ParameterRange::new(-100.0, 0.0);
        assert_eq!(target.convert_from(&source, 0.25), -75.0);
    }

    #[test]
    fn identity_detection() {
        assert!(ParameterRange::default().is_identity());
        assert!(!ParameterRange::new(0.0, 2.0).is_identity());
    }
}
