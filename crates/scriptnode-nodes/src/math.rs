//! Sample-wise math nodes.
//!
//! `math.add`, `math.mul`, `math.sub`, `math.clear` and `math.abs` each apply
//! one [`MathOp`] with a per-voice `Value` parameter. The legacy `math.op`
//! node picks the operation from its `OpType` property.

use std::fmt;

use snex_core::{
    NodeError, NodeObject, ParameterRange, ParameterSpec, PolyData, PrepareSpecs, ProcessData,
};

use crate::voice_specs;

/// Operation of a [`MathNode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathOp {
    /// `s + value`
    Add,
    /// `s * value`
    Mul,
    /// `s - value`
    Sub,
    /// `0`
    Clear,
    /// `|s|`
    Abs,
}

impl MathOp {
    /// Every operation.
    pub const ALL: [MathOp; 5] = [MathOp::Add, MathOp::Mul, MathOp::Sub, MathOp::Clear, MathOp::Abs];

    /// Operation by `OpType` name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// Name used in factory paths (`math.<name>`) and `OpType` properties.
    pub const fn name(self) -> &'static str {
        match self {
            MathOp::Add => "add",
            MathOp::Mul => "mul",
            MathOp::Sub => "sub",
            MathOp::Clear => "clear",
            MathOp::Abs => "abs",
        }
    }

    /// Default of the `Value` parameter.
    pub const fn default_value(self) -> f64 {
        match self {
            MathOp::Mul => 1.0,
            _ => 0.0,
        }
    }

    #[inline]
    fn apply(self, s: f32, value: f32) -> f32 {
        match self {
            MathOp::Add => s + value,
            MathOp::Mul => s * value,
            MathOp::Sub => s - value,
            MathOp::Clear => 0.0,
            MathOp::Abs => s.abs(),
        }
    }
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Applies a [`MathOp`] to every sample.
#[derive(Debug, Clone)]
pub struct MathNode {
    op: MathOp,
    polyphonic: bool,
    value: PolyData<f32>,
}

impl MathNode {
    /// A node with the operation's default value.
    pub fn new(op: MathOp, polyphonic: bool) -> Self {
        Self {
            op,
            polyphonic,
            value: PolyData::new(op.default_value() as f32),
        }
    }

    /// The operation.
    pub fn op(&self) -> MathOp {
        self.op
    }
}

impl NodeObject for MathNode {
    fn prepare(&mut self, specs: &PrepareSpecs) -> Result<(), NodeError> {
        self.value.prepare(&voice_specs(specs, self.polyphonic));
        Ok(())
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        let (op, value) = (self.op, *self.value.get());
        for ch in data.channels_mut() {
            ch.iter_mut().for_each(|s| *s = op.apply(*s, value));
        }
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        let (op, value) = (self.op, *self.value.get());
        frame.iter_mut().for_each(|s| *s = op.apply(*s, value));
    }

    fn reset(&mut self) {}

    fn set_parameter(&mut self, index: usize, value: f64) {
        if index == 0 {
            for v in self.value.voices_mut() {
                *v = value as f32;
            }
        }
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::new(
            "Value",
            ParameterRange::default(),
            self.op.default_value(),
        )]
    }

    fn is_polyphonic(&self) -> bool {
        self.polyphonic
    }
}

#[cfg(test)]
mod tests {
    use snex_core::AudioBuffer;

    use super::*;

    fn run(op: MathOp, value: f64, input: &[f32]) -> Vec<f32> {
        let mut node = MathNode::new(op, false);
        node.prepare(&PrepareSpecs::new(44100.0, 16, 1)).unwrap();
        node.set_parameter(0, value);
        let mut buffer = AudioBuffer::from_channels(&[input.to_vec()]);
        node.process(&mut buffer.as_process_data());
        buffer.channel(0).to_vec()
    }

    #[test]
    fn operations() {
        assert_eq!(run(MathOp::Add, 0.5, &[0.25, -1.0]), vec![0.75, -0.5]);
        assert_eq!(run(MathOp::Mul, 0.5, &[0.25, -1.0]), vec![0.125, -0.5]);
        assert_eq!(run(MathOp::Sub, 0.5, &[0.25, -1.0]), vec![-0.25, -1.5]);
        assert_eq!(run(MathOp::Clear, 0.5, &[0.25, -1.0]), vec![0.0, 0.0]);
        assert_eq!(run(MathOp::Abs, 0.5, &[0.25, -1.0]), vec![0.25, 1.0]);
    }

    #[test]
    fn names_round_trip() {
        for op in MathOp::ALL {
            assert_eq!(MathOp::from_name(op.name()), Some(op));
        }
        assert_eq!(MathOp::from_name("MUL"), Some(MathOp::Mul));
        assert_eq!(MathOp::from_name("div"), None);
    }

    #[test]
    fn mul_defaults_to_unity() {
        let node = MathNode::new(MathOp::Mul, false);
        assert_eq!(node.parameters()[0].default, 1.0);
        let mut frame = [0.5f32];
        let mut node = node;
        node.process_frame(&mut frame);
        assert_eq!(frame, [0.5]);
    }
}
