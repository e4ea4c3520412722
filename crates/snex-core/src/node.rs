//! The node contract.
//!
//! Every processing unit of a DSP network (built-in nodes, compiled SNEX
//! classes, frozen networks) implements [`NodeObject`]. Containers call the
//! contract on their children in declaration order.
//!
//! ## Design Decisions
//!
//! - **Object-safe**: networks store `Box<dyn NodeObject>` so that node kinds
//!   can be picked at runtime from a description.
//! - **Prepare reports, process degrades**: `prepare` returns a [`NodeError`]
//!   that the network records in its exception handler. The processing
//!   callbacks never fail; a node that can't run passes audio through.
//! - **No allocations**: `process`, `process_frame`, `reset` and
//!   `handle_hise_event` run on the audio thread.

use std::any::Any;

use crate::event::HiseEvent;
use crate::exception::{ErrorCode, NodeError};
use crate::external_data::{DataType, ExternalData};
use crate::param::ParameterRange;
use crate::process::ProcessData;
use crate::specs::PrepareSpecs;

/// Declaration of one node parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Parameter id, unique within the node.
    pub name: String,
    /// Value range.
    pub range: ParameterRange,
    /// Value after creation.
    pub default: f64,
}

impl ParameterSpec {
    /// A parameter with range and default value.
    pub fn new(name: impl Into<String>, range: ParameterRange, default: f64) -> Self {
        Self {
            name: name.into(),
            range,
            default,
        }
    }
}

/// Processing context a node insists on.
///
/// Checked against the prepare specs before the node's own `prepare` runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeRequirements {
    /// Only this sample rate is accepted.
    pub sample_rate: Option<f64>,
    /// Only this block size is accepted.
    pub block_size: Option<usize>,
    /// Must sit below a frame-based container.
    pub frame_parent: bool,
    /// Holds a single state and can't be split into voices.
    pub monophonic_only: bool,
}

impl NodeRequirements {
    /// Checks the fixed sample rate and block size.
    ///
    /// # Errors
    ///
    /// - [`ErrorCode::SampleRateMismatch`] for any other sample rate
    /// - [`ErrorCode::BlockSizeMismatch`] for any other block size
    pub fn check_specs(&self, specs: &PrepareSpecs) -> Result<(), NodeError> {
        if let Some(rate) = self.sample_rate {
            if specs.sample_rate != rate {
                return Err(NodeError::new(
                    ErrorCode::SampleRateMismatch,
                    rate as i32,
                    specs.sample_rate as i32,
                ));
            }
        }
        if let Some(block) = self.block_size {
            if specs.block_size != block {
                return Err(NodeError::new(
                    ErrorCode::BlockSizeMismatch,
                    block as i32,
                    specs.block_size as i32,
                ));
            }
        }
        Ok(())
    }

    /// Checks everything, given whether an ancestor processes frame by frame.
    ///
    /// # Errors
    ///
    /// - [`ErrorCode::NoMatchingParent`] outside a frame-based container
    /// - [`ErrorCode::IllegalPolyphony`] for a single-state node in a
    ///   polyphonic context
    /// - the errors of [`check_specs`](Self::check_specs)
    pub fn check(&self, specs: &PrepareSpecs, in_frame: bool) -> Result<(), NodeError> {
        if self.frame_parent && !in_frame {
            return Err(NodeError::simple(ErrorCode::NoMatchingParent));
        }
        if self.monophonic_only && specs.is_polyphonic() {
            return Err(NodeError::simple(ErrorCode::IllegalPolyphony));
        }
        self.check_specs(specs)
    }
}

/// Uniform interface of every processing unit.
///
/// # Example
///
/// ```rust
/// use snex_core::{NodeError, NodeObject, PrepareSpecs, ProcessData};
///
/// struct Invert;
///
/// impl NodeObject for Invert {
///     fn prepare(&mut self, _specs: &PrepareSpecs) -> Result<(), NodeError> {
///         Ok(())
///     }
///
///     fn process(&mut self, data: &mut ProcessData<'_>) {
///         for ch in data.channels_mut() {
///             ch.iter_mut().for_each(|s| *s = -*s);
///         }
///     }
///
///     fn process_frame(&mut self, frame: &mut [f32]) {
///         frame.iter_mut().for_each(|s| *s = -*s);
///     }
///
///     fn reset(&mut self) {}
/// }
///
/// let mut samples = [0.5f32, -0.25];
/// Invert.process_frame(&mut samples);
/// assert_eq!(samples, [-0.5, 0.25]);
/// ```
pub trait NodeObject: Send {
    /// Sets up processing for `specs`.
    ///
    /// An error leaves the node unprepared; it is recorded for the node and
    /// processing continues without it.
    fn prepare(&mut self, specs: &PrepareSpecs) -> Result<(), NodeError>;

    /// Processes a block in place.
    fn process(&mut self, data: &mut ProcessData<'_>);

    /// Processes one frame (one sample per channel) in place.
    fn process_frame(&mut self, frame: &mut [f32]);

    /// Clears internal state.
    fn reset(&mut self);

    /// Reacts to a note or controller event.
    fn handle_hise_event(&mut self, _event: &mut HiseEvent) {}

    /// Sets parameter `index`. Out-of-range indices are ignored.
    fn set_parameter(&mut self, _index: usize, _value: f64) {}

    /// Parameters in index order.
    fn parameters(&self) -> Vec<ParameterSpec> {
        Vec::new()
    }

    /// Binds slot `index` to `data`.
    fn set_external_data(&mut self, _data: &ExternalData, _index: usize) -> Result<(), NodeError> {
        Ok(())
    }

    /// Number of slots of `data_type` the node reads.
    fn data_slots(&self, _data_type: DataType) -> usize {
        0
    }

    /// Modulation value produced by the last callback, if any.
    fn handle_modulation(&mut self) -> Option<f64> {
        None
    }

    /// Whether the node keeps per-voice state.
    fn is_polyphonic(&self) -> bool {
        false
    }

    /// Processing latency in samples.
    fn latency_samples(&self) -> usize {
        0
    }

    /// Context the node can run in.
    fn requirements(&self) -> NodeRequirements {
        NodeRequirements::default()
    }

    /// Downcast hook for tooling.
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
}

impl<T: NodeObject + ?Sized> NodeObject for Box<T> {
    fn prepare(&mut self, specs: &PrepareSpecs) -> Result<(), NodeError> {
        (**self).prepare(specs)
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        (**self).process(data);
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        (**self).process_frame(frame);
    }

    fn reset(&mut self) {
        (**self).reset();
    }

    fn handle_hise_event(&mut self, event: &mut HiseEvent) {
        (**self).handle_hise_event(event);
    }

    fn set_parameter(&mut self, index: usize, value: f64) {
        (**self).set_parameter(index, value);
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        (**self).parameters()
    }

    fn set_external_data(&mut self, data: &ExternalData, index: usize) -> Result<(), NodeError> {
        (**self).set_external_data(data, index)
    }

    fn data_slots(&self, data_type: DataType) -> usize {
        (**self).data_slots(data_type)
    }

    fn handle_modulation(&mut self) -> Option<f64> {
        (**self).handle_modulation()
    }

    fn is_polyphonic(&self) -> bool {
        (**self).is_polyphonic()
    }

    fn latency_samples(&self) -> usize {
        (**self).latency_samples()
    }

    fn requirements(&self) -> NodeRequirements {
        (**self).requirements()
    }

    fn as_any(&self) -> Option<&dyn Any> {
        (**self).as_any()
    }
}
