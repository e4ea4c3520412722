//! Scriptnode Nodes - built-in node kinds and containers
//!
//! Every processing unit implements [`snex_core::NodeObject`]. A network
//! holds them in a tree of [`NodeBase`] values; inner tree elements are
//! [`Container`]s that decide how their children see the signal.
//!
//! ## Nodes
//!
//! - [`GainNode`] - Smoothed gain in dB, per voice (`core.gain`)
//! - [`TableNode`] - Waveshaping through a lookup table (`core.table`)
//! - [`PeakNode`] - Block peak as modulation source (`core.peak`)
//! - [`OscillatorNode`] - Sine, saw and square (`core.oscillator`)
//! - [`MathNode`] - Sample-wise arithmetic (`math.*`)
//! - [`EmptyNode`], [`Mono2StereoNode`] - Utilities
//! - [`SnexNode`] - A compiled SNEX class (`core.snex_node`)
//!
//! ## Containers
//!
//! - chain, split, multi - serial, parallel and per-channel routing
//! - frame, fix-block - per-frame and fixed-size block processing
//! - modchain - control-rate children on a mono copy of the signal
//! - oversample - children at 2x or 4x the sample rate
//!
//! ## Example
//!
//! ```rust
//! use snex_core::{AudioBuffer, ExceptionHandler, PrepareSpecs};
//! use scriptnode_nodes::{ContainerKind, MathNode, MathOp, NodeBase, PrepareContext};
//!
//! let mut root = NodeBase::container(
//!     "root",
//!     ContainerKind::Chain,
//!     vec![
//!         NodeBase::leaf("add", "math.add", Box::new(MathNode::new(MathOp::Add, false))),
//!         NodeBase::leaf("mul", "math.mul", Box::new(MathNode::new(MathOp::Mul, false))),
//!     ],
//! );
//!
//! let mut handler = ExceptionHandler::new();
//! root.prepare(&PrepareSpecs::new(44100.0, 4, 1), &mut PrepareContext::new(&mut handler));
//! root.find_mut("add").unwrap().set_parameter(0, 1.0);
//! root.find_mut("mul").unwrap().set_parameter(0, 0.5);
//!
//! let mut buffer = AudioBuffer::from_channels(&[vec![1.0; 4]]);
//! root.process(&mut buffer.as_process_data());
//! assert_eq!(buffer.channel(0), &[1.0; 4]);
//! ```

pub mod base;
pub mod container;
pub mod gain;
pub mod math;
pub mod modulation;
pub mod oscillator;
pub mod peak;
pub mod routing;
pub mod snex_node;
pub mod table;

// Re-export main types at crate root
pub use base::{NodeBase, NodeBody, PrepareContext};
pub use container::{Container, ContainerKind};
pub use gain::GainNode;
pub use math::{MathNode, MathOp};
pub use modulation::{ModulationBus, ModulationInput, ModulationOutput};
pub use oscillator::{OscillatorNode, Waveform};
pub use peak::PeakNode;
pub use routing::{EmptyNode, Mono2StereoNode};
pub use snex_node::SnexNode;
pub use table::TableNode;

use snex_core::PrepareSpecs;

/// Specs for a node's per-voice state.
///
/// Monophonic variants keep a single state even inside a polyphonic network,
/// so the voice context is dropped for them.
pub fn voice_specs(specs: &PrepareSpecs, polyphonic: bool) -> PrepareSpecs {
    let mut specs = specs.clone();
    if !polyphonic {
        specs.voice_index = None;
    }
    specs
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use snex_core::PolyHandler;

    use super::*;

    #[test]
    fn mono_variants_drop_voice_context() {
        let specs = PrepareSpecs::new(44100.0, 64, 2).with_poly_handler(Arc::new(PolyHandler::new(8)));
        assert!(voice_specs(&specs, true).is_polyphonic());
        assert!(voice_specs(&specs, false).voice_index.is_none());
        assert_eq!(voice_specs(&specs, false).num_channels, 2);
    }
}
