//! A compiled class instance driven through its callback table.

use std::any::Any;
use std::sync::Arc;

use crate::compiler::{CallbackId, CompiledClass};
use crate::error::TypeError;
use crate::event::HiseEvent;
use crate::exception::{ErrorCode, NodeError};
use crate::external_data::{DataType, ExternalData};
use crate::function::FunctionPointer;
use crate::node::{NodeObject, NodeRequirements, ParameterSpec};
use crate::object::ObjectMemory;
use crate::process::ProcessData;
use crate::specs::PrepareSpecs;
use crate::symbol::Symbol;
use crate::value::Value;

type PrepareFn = fn(&mut ObjectMemory, &PrepareSpecs);
type ProcessFn = fn(&mut ObjectMemory, &mut ProcessData<'_>);
type FrameFn = fn(&mut ObjectMemory, &mut [f32]);
type ResetFn = fn(&mut ObjectMemory);
type EventFn = fn(&mut ObjectMemory, &mut HiseEvent);
type ParameterFn = fn(&mut ObjectMemory, f64);
type ExternalDataFn = fn(&mut ObjectMemory, &ExternalData, usize);

#[derive(Default)]
struct Callbacks {
    prepare: Option<PrepareFn>,
    process: Option<ProcessFn>,
    process_frame: Option<FrameFn>,
    reset: Option<ResetFn>,
    handle_event: Option<EventFn>,
}

impl Callbacks {
    fn resolve(class: &CompiledClass) -> Self {
        let mut callbacks = Self::default();
        for id in CallbackId::ALL {
            match class.callback(id).and_then(|f| f.function) {
                Some(FunctionPointer::Prepare(f)) => callbacks.prepare = Some(f),
                Some(FunctionPointer::Process(f)) => callbacks.process = Some(f),
                Some(FunctionPointer::ProcessFrame(f)) => callbacks.process_frame = Some(f),
                Some(FunctionPointer::Reset(f)) => callbacks.reset = Some(f),
                Some(FunctionPointer::HandleEvent(f)) => callbacks.handle_event = Some(f),
                _ => {}
            }
        }
        callbacks
    }
}

/// One instance of a compiled class.
///
/// `prepare` must succeed before any other callback runs. Until then, and
/// after a failed prepare, `process`, `process_frame`, `reset` and
/// `handle_event` do nothing. All callbacks are direct function pointer calls
/// on the instance memory.
///
/// ```rust
/// use std::sync::Arc;
/// use snex_core::compiler::ClassDefinition;
/// use snex_core::{ErrorCode, JitCompiledNode, NativeType, ObjectMemory, PrepareSpecs, ProcessData, Value};
///
/// fn process(_: &mut ObjectMemory, _: &mut ProcessData<'_>) {}
/// fn frame(_: &mut ObjectMemory, _: &mut [f32]) {}
///
/// let class = ClassDefinition::new("Stereo")
///     .with_process(2, process)
///     .with_process_frame(2, frame)
///     .build(2)
///     .unwrap();
///
/// let mut node = JitCompiledNode::new(Arc::new(class)).unwrap();
/// let err = node.prepare(&PrepareSpecs::new(44100.0, 512, 1)).unwrap_err();
/// assert_eq!(err.code, ErrorCode::ChannelMismatch);
/// assert!(!node.is_prepared());
/// ```
pub struct JitCompiledNode {
    class: Arc<CompiledClass>,
    object: ObjectMemory,
    callbacks: Callbacks,
    parameters: Vec<Option<ParameterFn>>,
    external_data: Option<ExternalDataFn>,
    prepared: bool,
}

impl JitCompiledNode {
    /// Creates an instance with default member values.
    pub fn new(class: Arc<CompiledClass>) -> Result<Self, TypeError> {
        let object = class.create_instance()?;
        let callbacks = Callbacks::resolve(&class);
        let parameters = class
            .parameters()
            .iter()
            .map(|p| match p.function.function {
                Some(FunctionPointer::SetParameter(f)) => Some(f),
                _ => None,
            })
            .collect();
        let external_data = match class.external_data_callback().and_then(|f| f.function) {
            Some(FunctionPointer::SetExternalData(f)) => Some(f),
            _ => None,
        };

        let mut node = Self {
            class,
            object,
            callbacks,
            parameters,
            external_data,
            prepared: false,
        };
        for (index, p) in node.class.clone().parameters().iter().enumerate() {
            node.set_parameter(index, p.default);
        }
        Ok(node)
    }

    /// The compiled class.
    pub fn class(&self) -> &Arc<CompiledClass> {
        &self.class
    }

    /// Channel count of the class.
    pub fn num_channels(&self) -> usize {
        self.class.num_channels()
    }

    /// Whether the last `prepare` succeeded.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Prepares the instance.
    ///
    /// Fails with [`ErrorCode::ChannelMismatch`] when the class needs more
    /// channels than `specs` provides, and with a rate or block size mismatch
    /// when the class was declared for fixed ones. The node then stays
    /// unprepared.
    pub fn prepare(&mut self, specs: &PrepareSpecs) -> Result<(), NodeError> {
        let needed = self.class.num_channels();
        if needed > specs.num_channels {
            self.prepared = false;
            return Err(NodeError::new(
                ErrorCode::ChannelMismatch,
                needed as i32,
                specs.num_channels as i32,
            ));
        }
        if let Err(e) = self.class.requirements().check_specs(specs) {
            self.prepared = false;
            return Err(e);
        }

        if let Some(f) = self.callbacks.prepare {
            f(&mut self.object, specs);
        }
        self.prepared = true;
        Ok(())
    }

    /// Calls `process` on the first `num_channels` channels of `data`.
    pub fn process(&mut self, data: &mut ProcessData<'_>) {
        let Some(f) = self.callbacks.process.filter(|_| self.prepared) else {
            return;
        };
        let channels = self.class.num_channels();
        if data.num_channels() > channels {
            f(&mut self.object, &mut data.sub_channels(0, channels));
        } else {
            f(&mut self.object, data);
        }
    }

    /// Calls `processFrame` on the first `num_channels` samples of `frame`.
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        let Some(f) = self.callbacks.process_frame.filter(|_| self.prepared) else {
            return;
        };
        let channels = self.class.num_channels().min(frame.len());
        f(&mut self.object, &mut frame[..channels]);
    }

    /// Calls `reset`.
    pub fn reset(&mut self) {
        if let Some(f) = self.callbacks.reset.filter(|_| self.prepared) {
            f(&mut self.object);
        }
    }

    /// Calls `handleEvent`.
    pub fn handle_event(&mut self, event: &mut HiseEvent) {
        if let Some(f) = self.callbacks.handle_event.filter(|_| self.prepared) {
            f(&mut self.object, event);
        }
    }

    /// Calls parameter setter `index`.
    pub fn set_parameter(&mut self, index: usize, value: f64) {
        if let Some(Some(f)) = self.parameters.get(index) {
            f(&mut self.object, value);
        }
    }

    /// Parameter names in index order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.class.parameters().iter().map(|p| p.name.as_str()).collect()
    }

    /// Passes `data` to the class's `setExternalData` callback.
    pub fn set_external_data(&mut self, data: &ExternalData, index: usize) {
        if let Some(f) = self.external_data {
            f(&mut self.object, data, index);
        }
    }

    /// Slots of `data_type` the class uses.
    pub fn data_slots(&self, data_type: DataType) -> usize {
        self.class.data_slots(data_type)
    }

    /// Calls member function `id` on the instance.
    pub fn call_function(&mut self, id: &str, args: &[Value]) -> Result<Value, TypeError> {
        let symbol = Symbol::from_path([self.class.id(), id]);
        let function = self
            .class
            .functions()
            .and_then(|c| c.functions().iter().find(|f| f.id == symbol).cloned())
            .ok_or_else(|| TypeError::UnresolvedFunction(symbol.to_string()))?;
        function.call_member(&mut self.object, args)
    }

    /// Instance memory.
    pub fn object(&self) -> &ObjectMemory {
        &self.object
    }

    /// Mutable instance memory.
    pub fn object_mut(&mut self) -> &mut ObjectMemory {
        &mut self.object
    }

    /// Debug rendering of the instance.
    pub fn dump(&self) -> String {
        self.object.dump()
    }
}

impl std::fmt::Debug for JitCompiledNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitCompiledNode")
            .field("class", &self.class.id())
            .field("channels", &self.class.num_channels())
            .field("prepared", &self.prepared)
            .finish()
    }
}

impl NodeObject for JitCompiledNode {
    fn prepare(&mut self, specs: &PrepareSpecs) -> Result<(), NodeError> {
        JitCompiledNode::prepare(self, specs)
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        JitCompiledNode::process(self, data);
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        JitCompiledNode::process_frame(self, frame);
    }

    fn reset(&mut self) {
        JitCompiledNode::reset(self);
    }

    fn handle_hise_event(&mut self, event: &mut HiseEvent) {
        self.handle_event(event);
    }

    fn set_parameter(&mut self, index: usize, value: f64) {
        JitCompiledNode::set_parameter(self, index, value);
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        self.class
            .parameters()
            .iter()
            .map(|p| ParameterSpec::new(p.name.clone(), p.range, p.default))
            .collect()
    }

    fn set_external_data(&mut self, data: &ExternalData, index: usize) -> Result<(), NodeError> {
        JitCompiledNode::set_external_data(self, data, index);
        Ok(())
    }

    fn data_slots(&self, data_type: DataType) -> usize {
        JitCompiledNode::data_slots(self, data_type)
    }

    fn requirements(&self) -> NodeRequirements {
        self.class.requirements()
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ClassDefinition;
    use crate::param::ParameterRange;
    use crate::process::AudioBuffer;
    use crate::value::NativeType;

    fn process(obj: &mut ObjectMemory, data: &mut ProcessData<'_>) {
        let gain = obj.float(0);
        for ch in data.channels_mut() {
            ch.iter_mut().for_each(|s| *s *= gain);
        }
        obj.set_int(1, obj.int(1) + 1);
    }

    fn frame(obj: &mut ObjectMemory, frame: &mut [f32]) {
        let gain = obj.float(0);
        frame.iter_mut().for_each(|s| *s *= gain);
    }

    fn reset(obj: &mut ObjectMemory) {
        obj.set_int(1, 0);
    }

    fn note(obj: &mut ObjectMemory, e: &mut HiseEvent) {
        obj.set_int(2, e.note_number());
    }

    fn set_gain(obj: &mut ObjectMemory, v: f64) {
        obj.set_double(0, v);
    }

    fn store_table(obj: &mut ObjectMemory, data: &ExternalData, index: usize) {
        if data.as_table().is_some() {
            obj.set_int(2, index as i32 + 100);
        }
    }

    fn gain_node(channels: usize) -> JitCompiledNode {
        let class = ClassDefinition::new("Gain")
            .with_member("gain", NativeType::Float, Value::Float(0.5))
            .with_member("calls", NativeType::Integer, Value::Integer(0))
            .with_member("note", NativeType::Integer, Value::Integer(-1))
            .with_process(channels, process)
            .with_process_frame(channels, frame)
            .with_reset(reset)
            .with_handle_event(note)
            .with_parameter("Gain", ParameterRange::default(), 0.25, set_gain)
            .with_external_data(DataType::Table, 1, store_table)
            .build(channels)
            .unwrap();
        JitCompiledNode::new(Arc::new(class)).unwrap()
    }

    #[test]
    fn parameter_defaults_applied_on_creation() {
        let node = gain_node(1);
        assert_eq!(node.object().float(0), 0.25);
        assert_eq!(node.parameter_names(), vec!["Gain"]);
    }

    #[test]
    fn process_before_prepare_is_noop() {
        let mut node = gain_node(1);
        let mut buffer = AudioBuffer::from_channels(&[vec![1.0; 4]]);
        node.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[1.0; 4]);
        assert_eq!(node.object().int(1), 0);
    }

    #[test]
    fn channel_mismatch_leaves_node_unprepared() {
        let mut node = gain_node(2);
        let err = node.prepare(&PrepareSpecs::new(44100.0, 64, 1)).unwrap_err();
        assert_eq!(err, NodeError::new(ErrorCode::ChannelMismatch, 2, 1));
        assert_eq!(err.message(), "Channel amount mismatch: 1 (expected: 2)");

        let mut buffer = AudioBuffer::from_channels(&[vec![1.0; 4]]);
        node.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[1.0; 4]);
    }

    #[test]
    fn fixed_rate_and_block_size_are_enforced() {
        let class = ClassDefinition::new("Fixed")
            .with_process(1, process)
            .with_process_frame(1, frame)
            .with_sample_rate(48000.0)
            .with_block_size(32)
            .build(1)
            .unwrap();
        let mut node = JitCompiledNode::new(Arc::new(class)).unwrap();

        let err = node.prepare(&PrepareSpecs::new(44100.0, 32, 1)).unwrap_err();
        assert_eq!(err, NodeError::new(ErrorCode::SampleRateMismatch, 48000, 44100));
        assert_eq!(err.message(), "Samplerate mismatch: 44100 (expected: 48000)");
        assert!(!node.is_prepared());

        let err = node.prepare(&PrepareSpecs::new(48000.0, 64, 1)).unwrap_err();
        assert_eq!(err, NodeError::new(ErrorCode::BlockSizeMismatch, 32, 64));

        node.prepare(&PrepareSpecs::new(48000.0, 32, 1)).unwrap();
        assert!(node.is_prepared());
        let requirements = NodeObject::requirements(&node);
        assert!(requirements.monophonic_only);
        assert!(!requirements.frame_parent);
    }

    #[test]
    fn processes_only_declared_channels() {
        let mut node = gain_node(1);
        node.prepare(&PrepareSpecs::new(44100.0, 64, 2)).unwrap();

        let mut buffer = AudioBuffer::from_channels(&[vec![1.0; 4], vec![1.0; 4]]);
        node.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[0.25; 4]);
        assert_eq!(buffer.channel(1), &[1.0; 4]);

        let mut frame = [1.0, 1.0];
        node.process_frame(&mut frame);
        assert_eq!(frame, [0.25, 1.0]);
    }

    #[test]
    fn reset_and_events_after_prepare() {
        let mut node = gain_node(1);
        let mut event = HiseEvent::note_on(1, 64, 100);
        node.handle_event(&mut event);
        assert_eq!(node.object().int(2), -1);

        node.prepare(&PrepareSpecs::new(44100.0, 64, 1)).unwrap();
        node.handle_event(&mut event);
        assert_eq!(node.object().int(2), 64);

        let mut buffer = AudioBuffer::new(1, 8);
        node.process(&mut buffer.as_process_data());
        assert_eq!(node.object().int(1), 1);
        node.reset();
        assert_eq!(node.object().int(1), 0);
    }

    #[test]
    fn external_data_reaches_callback() {
        let mut node = gain_node(1);
        assert_eq!(node.data_slots(DataType::Table), 1);
        node.set_external_data(&ExternalData::create(DataType::Table), 0);
        assert_eq!(node.object().int(2), 100);
    }

    #[test]
    fn dump_lists_members() {
        let node = gain_node(1);
        let dump = node.dump();
        assert!(dump.contains("gain"), "{dump}");
        assert!(dump.contains("calls"), "{dump}");
    }
}
