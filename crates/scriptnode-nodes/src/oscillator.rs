//! Per-voice oscillator.

use core::f64::consts::TAU;

use snex_core::{
    HiseEvent, NodeError, NodeObject, ParameterRange, ParameterSpec, PolyData, PrepareSpecs,
    ProcessData,
};

use crate::voice_specs;

/// Oscillator waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    /// Sine wave.
    #[default]
    Sine,
    /// Rising sawtooth.
    Saw,
    /// Square wave.
    Square,
}

impl Waveform {
    /// Waveform from a parameter value (rounded index).
    pub fn from_index(index: f64) -> Self {
        match index.round() as i64 {
            1 => Waveform::Saw,
            2 => Waveform::Square,
            _ => Waveform::Sine,
        }
    }

    /// Waveform by name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sine" => Some(Waveform::Sine),
            "saw" => Some(Waveform::Saw),
            "square" => Some(Waveform::Square),
            _ => None,
        }
    }

    /// Parameter index.
    pub fn index(self) -> usize {
        match self {
            Waveform::Sine => 0,
            Waveform::Saw => 1,
            Waveform::Square => 2,
        }
    }

    #[inline]
    fn sample(self, phase: f64) -> f32 {
        match self {
            Waveform::Sine => libm::sin(phase * TAU) as f32,
            Waveform::Saw => (2.0 * phase - 1.0) as f32,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// Parameter indices of [`OscillatorNode`].
pub mod param {
    /// Waveform index.
    pub const MODE: usize = 0;
    /// Frequency in Hz.
    pub const FREQUENCY: usize = 1;
    /// Linear output gain.
    pub const GAIN: usize = 2;
}

#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    phase: f64,
    increment: f64,
    frequency: f64,
}

/// Adds a sine, saw or square wave to every channel.
///
/// Each voice has its own phase and frequency; a note-on sets the voice's
/// frequency from the note and restarts its phase.
#[derive(Debug, Clone)]
pub struct OscillatorNode {
    polyphonic: bool,
    voices: PolyData<Voice>,
    waveform: Waveform,
    frequency: f64,
    gain: f32,
    sample_rate: f64,
}

impl OscillatorNode {
    /// A 220 Hz oscillator at full gain.
    pub fn new(polyphonic: bool, waveform: Waveform) -> Self {
        let mut osc = Self {
            polyphonic,
            voices: PolyData::new(Voice::default()),
            waveform,
            frequency: 220.0,
            gain: 1.0,
            sample_rate: 44100.0,
        };
        osc.set_frequency(osc.frequency);
        osc
    }

    /// Current waveform.
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        let increment = frequency / self.sample_rate;
        for v in self.voices.voices_mut() {
            v.frequency = frequency;
            v.increment = increment;
        }
    }

    #[inline]
    fn tick(voice: &mut Voice, waveform: Waveform, gain: f32) -> f32 {
        let s = waveform.sample(voice.phase) * gain;
        voice.phase += voice.increment;
        voice.phase -= voice.phase.floor();
        s
    }
}

impl NodeObject for OscillatorNode {
    fn prepare(&mut self, specs: &PrepareSpecs) -> Result<(), NodeError> {
        self.sample_rate = specs.sample_rate;
        self.voices.prepare(&voice_specs(specs, self.polyphonic));
        let increment = self.frequency / self.sample_rate;
        for v in self.voices.all_mut() {
            v.frequency = self.frequency;
            v.increment = increment;
        }
        Ok(())
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        let (waveform, gain) = (self.waveform, self.gain);
        let voice = self.voices.get_mut();
        data.for_each_frame(|frame| {
            let s = Self::tick(voice, waveform, gain);
            frame.iter_mut().for_each(|x| *x += s);
        });
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        let s = Self::tick(self.voices.get_mut(), self.waveform, self.gain);
        frame.iter_mut().for_each(|x| *x += s);
    }

    fn reset(&mut self) {
        for v in self.voices.voices_mut() {
            v.phase = 0.0;
        }
    }

    fn handle_hise_event(&mut self, event: &mut HiseEvent) {
        if event.is_note_on() {
            let frequency = event.frequency();
            let v = self.voices.get_mut();
            v.frequency = frequency;
            v.increment = frequency / self.sample_rate;
            v.phase = 0.0;
        }
    }

    fn set_parameter(&mut self, index: usize, value: f64) {
        match index {
            param::MODE => self.waveform = Waveform::from_index(value),
            param::FREQUENCY => self.set_frequency(value),
            param::GAIN => self.gain = value as f32,
            _ => {}
        }
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::new(
                "Mode",
                ParameterRange::new(0.0, 2.0).with_step(1.0),
                self.waveform.index() as f64,
            ),
            ParameterSpec::new(
                "Frequency",
                ParameterRange::new(20.0, 20000.0).with_step(0.1).with_centre_skew(1000.0),
                self.frequency,
            ),
            ParameterSpec::new("Gain", ParameterRange::new(0.0, 1.0), f64::from(self.gain)),
        ]
    }

    fn is_polyphonic(&self) -> bool {
        self.polyphonic
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use snex_core::{AudioBuffer, PolyHandler, VoiceSetter};

    use super::*;

    #[test]
    fn square_at_quarter_rate() {
        let mut osc = OscillatorNode::new(false, Waveform::Square);
        osc.prepare(&PrepareSpecs::new(8.0, 8, 1)).unwrap();
        osc.set_parameter(param::FREQUENCY, 2.0);

        let mut buffer = AudioBuffer::new(1, 8);
        osc.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn output_is_added() {
        let mut osc = OscillatorNode::new(false, Waveform::Saw);
        osc.prepare(&PrepareSpecs::new(4.0, 4, 2)).unwrap();
        osc.set_parameter(param::FREQUENCY, 1.0);
        osc.set_parameter(param::GAIN, 0.5);

        let mut buffer = AudioBuffer::from_channels(&[vec![1.0; 2], vec![0.0; 2]]);
        osc.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[0.5, 0.75]);
        assert_eq!(buffer.channel(1), &[-0.5, -0.25]);
    }

    #[test]
    fn note_on_sets_voice_frequency() {
        let handler = Arc::new(PolyHandler::new(2));
        let mut osc = OscillatorNode::new(true, Waveform::Sine);
        osc.prepare(&PrepareSpecs::new(44100.0, 64, 1).with_poly_handler(Arc::clone(&handler)))
            .unwrap();

        {
            let _voice = VoiceSetter::new(&handler, 1);
            osc.handle_hise_event(&mut HiseEvent::note_on(1, 69, 100));
        }
        let voices = osc.voices.all();
        assert!((voices[1].frequency - 440.0).abs() < 1e-6);
        assert_eq!(voices[0].frequency, 220.0);
    }

    #[test]
    fn waveform_names() {
        assert_eq!(Waveform::from_name("SAW"), Some(Waveform::Saw));
        assert_eq!(Waveform::from_name("noise"), None);
        assert_eq!(Waveform::from_index(2.2), Waveform::Square);
    }
}
