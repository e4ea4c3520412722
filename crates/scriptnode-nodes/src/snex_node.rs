//! Node running a compiled SNEX class.

use std::fmt;
use std::sync::Arc;

use snex_core::{
    CompileError, DataType, ErrorCode, ExternalData, HiseEvent, JitCompiledNode, NodeError,
    NodeObject, NodeRequirements, ParameterSpec, PrepareSpecs, ProcessData, SnexCompiler,
};

/// Wraps a [`JitCompiledNode`] and recompiles it when the channel count
/// changes.
///
/// The class is compiled once on creation so that its parameters are known
/// before the network is prepared. Parameter values and data bindings are
/// replayed onto every recompiled instance.
pub struct SnexNode {
    compiler: Arc<dyn SnexCompiler>,
    code: String,
    class_id: String,
    node: Option<JitCompiledNode>,
    error: Option<CompileError>,
    values: Vec<Option<f64>>,
    bindings: Vec<(usize, ExternalData)>,
}

impl SnexNode {
    /// Compiles `class_id` from `code` for `num_channels` channels.
    ///
    /// A compile failure is kept and reported on [`prepare`](NodeObject::prepare).
    pub fn new(
        compiler: Arc<dyn SnexCompiler>,
        code: impl Into<String>,
        class_id: impl Into<String>,
        num_channels: usize,
    ) -> Self {
        let mut node = Self {
            compiler,
            code: code.into(),
            class_id: class_id.into(),
            node: None,
            error: None,
            values: Vec::new(),
            bindings: Vec::new(),
        };
        node.recompile(num_channels);
        node
    }

    /// The compiled instance, if compilation succeeded.
    pub fn compiled(&self) -> Option<&JitCompiledNode> {
        self.node.as_ref()
    }

    /// The last compile failure.
    pub fn compile_error(&self) -> Option<&CompileError> {
        self.error.as_ref()
    }

    /// Class id.
    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    fn recompile(&mut self, num_channels: usize) {
        let result = self
            .compiler
            .compile(&self.code, &self.class_id, num_channels)
            .and_then(|class| JitCompiledNode::new(class).map_err(CompileError::from));

        match result {
            Ok(mut node) => {
                for (i, v) in self.values.iter().enumerate() {
                    if let Some(v) = v {
                        node.set_parameter(i, *v);
                    }
                }
                for (index, data) in &self.bindings {
                    node.set_external_data(data, *index);
                }
                tracing::debug!(class = %self.class_id, num_channels, "compiled snex class");
                self.node = Some(node);
                self.error = None;
            }
            Err(e) => {
                tracing::warn!(class = %self.class_id, error = %e, "snex compilation failed");
                self.node = None;
                self.error = Some(e);
            }
        }
    }
}

impl fmt::Debug for SnexNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnexNode")
            .field("class_id", &self.class_id)
            .field("node", &self.node)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl NodeObject for SnexNode {
    fn prepare(&mut self, specs: &PrepareSpecs) -> Result<(), NodeError> {
        let channels_changed = self
            .node
            .as_ref()
            .is_some_and(|n| n.num_channels() != specs.num_channels);
        if self.node.is_none() || channels_changed {
            self.recompile(specs.num_channels);
        }

        if let Some(e) = &self.error {
            return Err(e.to_node_error());
        }
        match &mut self.node {
            Some(node) => node.prepare(specs),
            None => Err(NodeError::simple(ErrorCode::InitialisationError)),
        }
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        if let Some(node) = &mut self.node {
            node.process(data);
        }
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        if let Some(node) = &mut self.node {
            node.process_frame(frame);
        }
    }

    fn reset(&mut self) {
        if let Some(node) = &mut self.node {
            node.reset();
        }
    }

    fn handle_hise_event(&mut self, event: &mut HiseEvent) {
        if let Some(node) = &mut self.node {
            node.handle_event(event);
        }
    }

    fn set_parameter(&mut self, index: usize, value: f64) {
        if self.values.len() <= index {
            self.values.resize(index + 1, None);
        }
        self.values[index] = Some(value);
        if let Some(node) = &mut self.node {
            node.set_parameter(index, value);
        }
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        self.node
            .as_ref()
            .map(NodeObject::parameters)
            .unwrap_or_default()
    }

    fn set_external_data(&mut self, data: &ExternalData, index: usize) -> Result<(), NodeError> {
        match self.bindings.iter_mut().find(|(i, _)| *i == index) {
            Some(slot) => slot.1 = data.clone(),
            None => self.bindings.push((index, data.clone())),
        }
        if let Some(node) = &mut self.node {
            node.set_external_data(data, index);
        }
        Ok(())
    }

    fn data_slots(&self, data_type: DataType) -> usize {
        self.node.as_ref().map_or(0, |n| n.data_slots(data_type))
    }

    fn requirements(&self) -> NodeRequirements {
        self.node.as_ref().map_or(
            NodeRequirements {
                monophonic_only: true,
                ..NodeRequirements::default()
            },
            |n| n.class().requirements(),
        )
    }
}

#[cfg(test)]
mod tests {
    use snex_core::{
        AudioBuffer, ClassDefinition, CompileResult, CompiledClass, NativeType, ObjectMemory,
        ParameterRange, Value,
    };

    use super::*;

    fn scale(obj: &mut ObjectMemory, data: &mut ProcessData<'_>) {
        let g = obj.float(0);
        for ch in data.channels_mut() {
            ch.iter_mut().for_each(|s| *s *= g);
        }
    }

    fn scale_frame(obj: &mut ObjectMemory, frame: &mut [f32]) {
        let g = obj.float(0);
        frame.iter_mut().for_each(|s| *s *= g);
    }

    fn set_gain(obj: &mut ObjectMemory, value: f64) {
        obj.set_double(0, value);
    }

    /// Builds `Scale` for whatever channel count is requested.
    struct ScaleCompiler;

    impl SnexCompiler for ScaleCompiler {
        fn compile(&self, _code: &str, class_id: &str, num_channels: usize) -> CompileResult<Arc<CompiledClass>> {
            if class_id != "Scale" {
                return Err(CompileError::at(format!("Unknown class {class_id}"), 1, 8));
            }
            let class = ClassDefinition::new("Scale")
                .with_member("gain", NativeType::Float, Value::Float(1.0))
                .with_parameter("Gain", ParameterRange::default(), 1.0, set_gain)
                .with_process(num_channels, scale)
                .with_process_frame(num_channels, scale_frame)
                .build(num_channels)?;
            Ok(Arc::new(class))
        }
    }

    struct Scale;

    impl Scale {
        fn compiler() -> Arc<dyn SnexCompiler> {
            Arc::new(ScaleCompiler)
        }
    }

    const CODE: &str = "struct Scale {};";

    #[test]
    fn parameters_are_known_before_prepare() {
        let node = SnexNode::new(Scale::compiler(), CODE, "Scale", 2);
        assert_eq!(node.parameters().len(), 1);
        assert_eq!(node.parameters()[0].name, "Gain");
    }

    #[test]
    fn recompiles_for_channel_count_and_keeps_values() {
        let mut node = SnexNode::new(Scale::compiler(), CODE, "Scale", 2);
        node.set_parameter(0, 0.5);
        node.prepare(&PrepareSpecs::new(44100.0, 16, 1)).unwrap();
        assert_eq!(node.compiled().map(JitCompiledNode::num_channels), Some(1));

        let mut buffer = AudioBuffer::from_channels(&[vec![1.0; 2]]);
        node.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[0.5, 0.5]);
    }

    #[test]
    fn unknown_class_reports_compile_fail() {
        let mut node = SnexNode::new(Scale::compiler(), "struct Other {};", "Other", 2);
        assert!(node.compile_error().is_some());
        assert!(node.parameters().is_empty());

        let err = node.prepare(&PrepareSpecs::new(44100.0, 16, 2)).unwrap_err();
        assert_eq!(err, NodeError::compile_fail(1, 8));

        let mut buffer = AudioBuffer::from_channels(&[vec![0.25]]);
        node.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[0.25]);
    }
}
