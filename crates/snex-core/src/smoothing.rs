//! Linear parameter smoothing.
//!
//! Parameter changes are spread over a fixed ramp time to avoid zipper
//! noise:
//!
//! ```rust
//! use snex_core::LinearSmoothedValue;
//!
//! let mut gain = LinearSmoothedValue::with_config(0.0, 48000.0, 10.0);
//! gain.set_target(1.0);
//!
//! for _ in 0..480 {
//!     gain.advance();
//! }
//! assert!(gain.is_settled());
//! ```

/// A value that moves towards its target in equal steps.
///
/// The step count is fixed when the target is set, so the ramp always takes
/// the configured time regardless of the distance.
#[derive(Debug, Clone)]
pub struct LinearSmoothedValue {
    current: f32,
    target: f32,
    increment: f32,
    samples_remaining: u32,
    sample_rate: f64,
    ramp_time_ms: f64,
}

impl LinearSmoothedValue {
    /// A settled value without smoothing.
    pub fn new(initial: f32) -> Self {
        Self::with_config(initial, 44100.0, 0.0)
    }

    /// A settled value with sample rate and ramp time.
    pub fn with_config(initial: f32, sample_rate: f64, ramp_time_ms: f64) -> Self {
        Self {
            current: initial,
            target: initial,
            increment: 0.0,
            samples_remaining: 0,
            sample_rate,
            ramp_time_ms,
        }
    }

    /// Sets the ramp length used by the next target change.
    pub fn prepare(&mut self, sample_rate: f64, ramp_time_ms: f64) {
        self.sample_rate = sample_rate;
        self.ramp_time_ms = ramp_time_ms;
    }

    /// Starts a ramp to `target`.
    pub fn set_target(&mut self, target: f32) {
        if (target - self.target).abs() < 1e-9 {
            return;
        }

        self.target = target;
        let samples = (self.ramp_time_ms * 0.001 * self.sample_rate) as u32;
        if samples == 0 {
            self.set_immediate(target);
        } else {
            self.increment = (target - self.current) / samples as f32;
            self.samples_remaining = samples;
        }
    }

    /// Jumps to `value` without a ramp.
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.increment = 0.0;
        self.samples_remaining = 0;
    }

    /// Next value of the ramp.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        if self.samples_remaining > 0 {
            self.current += self.increment;
            self.samples_remaining -= 1;
            if self.samples_remaining == 0 {
                self.current = self.target;
            }
        }
        self.current
    }

    /// Current value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// Target value.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the ramp is finished.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.samples_remaining == 0
    }
}

impl Default for LinearSmoothedValue {
    fn default() -> Self {
        Self::new(0.0)
    }
}
