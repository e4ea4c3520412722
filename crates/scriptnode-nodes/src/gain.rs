//! Smoothed gain stage.

use snex_core::math::db_to_gain;
use snex_core::{
    HiseEvent, LinearSmoothedValue, NodeError, NodeObject, ParameterRange, ParameterSpec,
    PolyData, PrepareSpecs, ProcessData,
};

use crate::voice_specs;

/// Parameter indices of [`GainNode`].
pub mod param {
    /// Gain in dB.
    pub const GAIN: usize = 0;
    /// Ramp time in milliseconds.
    pub const SMOOTHING: usize = 1;
    /// Gain in dB a voice starts from on note-on.
    pub const RESET_VALUE: usize = 2;
}

/// Gain in decibels with a linear ramp per voice.
///
/// A note-on jumps the voice to the reset value and ramps from there to the
/// current gain.
///
/// # Example
///
/// ```rust
/// use snex_core::{AudioBuffer, NodeObject, PrepareSpecs};
/// use scriptnode_nodes::GainNode;
///
/// let mut gain = GainNode::new(false);
/// gain.prepare(&PrepareSpecs::new(44100.0, 64, 1)).unwrap();
/// gain.set_parameter(0, -100.0);
/// gain.reset();
///
/// let mut buffer = AudioBuffer::from_channels(&[vec![1.0; 4]]);
/// gain.process(&mut buffer.as_process_data());
/// assert_eq!(buffer.channel(0), &[0.0; 4]);
/// ```
#[derive(Debug, Clone)]
pub struct GainNode {
    polyphonic: bool,
    gain: PolyData<LinearSmoothedValue>,
    gain_db: f64,
    smoothing_ms: f64,
    reset_db: f64,
    sample_rate: f64,
}

impl GainNode {
    /// A unity gain stage.
    pub fn new(polyphonic: bool) -> Self {
        Self {
            polyphonic,
            gain: PolyData::new(LinearSmoothedValue::new(1.0)),
            gain_db: 0.0,
            smoothing_ms: 20.0,
            reset_db: 0.0,
            sample_rate: 44100.0,
        }
    }

    /// Current gain in dB.
    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    fn target(&self) -> f32 {
        db_to_gain(self.gain_db as f32)
    }
}

impl NodeObject for GainNode {
    fn prepare(&mut self, specs: &PrepareSpecs) -> Result<(), NodeError> {
        self.sample_rate = specs.sample_rate;
        self.gain.prepare(&voice_specs(specs, self.polyphonic));
        let target = self.target();
        for v in self.gain.all_mut() {
            v.prepare(self.sample_rate, self.smoothing_ms);
            v.set_immediate(target);
        }
        Ok(())
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        let g = self.gain.get_mut();
        if g.is_settled() {
            let gain = g.get();
            for ch in data.channels_mut() {
                ch.iter_mut().for_each(|s| *s *= gain);
            }
            return;
        }

        data.for_each_frame(|frame| {
            let gain = g.advance();
            frame.iter_mut().for_each(|s| *s *= gain);
        });
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        let gain = self.gain.get_mut().advance();
        frame.iter_mut().for_each(|s| *s *= gain);
    }

    fn reset(&mut self) {
        for v in self.gain.voices_mut() {
            let target = v.target();
            v.set_immediate(target);
        }
    }

    fn handle_hise_event(&mut self, event: &mut HiseEvent) {
        if event.is_note_on() {
            let start = db_to_gain(self.reset_db as f32);
            let target = self.target();
            let g = self.gain.get_mut();
            g.set_immediate(start);
            g.set_target(target);
        }
    }

    fn set_parameter(&mut self, index: usize, value: f64) {
        match index {
            param::GAIN => {
                self.gain_db = value;
                let target = self.target();
                for v in self.gain.voices_mut() {
                    v.set_target(target);
                }
            }
            param::SMOOTHING => {
                self.smoothing_ms = value.max(0.0);
                for v in self.gain.all_mut() {
                    v.prepare(self.sample_rate, self.smoothing_ms);
                }
            }
            param::RESET_VALUE => self.reset_db = value,
            _ => {}
        }
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::new("Gain", ParameterRange::decibels(-100.0, 0.0), 0.0),
            ParameterSpec::new("Smoothing", ParameterRange::new(0.0, 1000.0).with_step(0.1), 20.0),
            ParameterSpec::new("ResetValue", ParameterRange::decibels(-100.0, 0.0), 0.0),
        ]
    }

    fn is_polyphonic(&self) -> bool {
        self.polyphonic
    }
}
