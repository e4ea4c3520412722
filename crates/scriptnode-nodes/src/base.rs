//! The tree element of a DSP network.
//!
//! A [`NodeBase`] wraps either a leaf [`NodeObject`] or a [`Container`] and
//! adds what every node of a network has: an id, the factory path it was
//! created from, a bypass flag, parameter values and modulation routing.
//!
//! A node whose `prepare` failed is skipped by every processing callback
//! until the next successful prepare, as is a bypassed node. The error is
//! recorded in the [`ExceptionHandler`] passed through [`PrepareContext`].

use snex_core::{
    DataType, ExceptionHandler, ExternalData, HiseEvent, NodeError, NodeObject, ParameterSpec,
    PrepareSpecs, ProcessData,
};

use crate::container::{Container, ContainerKind};
use crate::modulation::{ModulationInput, ModulationOutput};

/// State threaded through a prepare walk.
#[derive(Debug)]
pub struct PrepareContext<'a> {
    /// Collects the errors of every node.
    pub handler: &'a mut ExceptionHandler,
    /// Whether an ancestor processes frame by frame.
    pub in_frame: bool,
}

impl<'a> PrepareContext<'a> {
    /// Context for the root of a tree.
    pub fn new(handler: &'a mut ExceptionHandler) -> Self {
        Self {
            handler,
            in_frame: false,
        }
    }

    /// Context for the children of a frame-based container.
    pub fn frame(&mut self) -> PrepareContext<'_> {
        PrepareContext {
            handler: &mut *self.handler,
            in_frame: true,
        }
    }

    /// Context for the children of any other container.
    pub fn child(&mut self) -> PrepareContext<'_> {
        PrepareContext {
            handler: &mut *self.handler,
            in_frame: self.in_frame,
        }
    }
}

/// What a [`NodeBase`] runs.
pub enum NodeBody {
    /// A processing unit.
    Leaf(Box<dyn NodeObject>),
    /// Child nodes with a routing.
    Container(Container),
}

impl std::fmt::Debug for NodeBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeBody::Leaf(_) => f.write_str("Leaf"),
            NodeBody::Container(c) => f.debug_tuple("Container").field(c).finish(),
        }
    }
}

/// One node of a network tree.
#[derive(Debug)]
pub struct NodeBase {
    id: String,
    path: String,
    bypassed: bool,
    body: NodeBody,
    parameters: Vec<ParameterSpec>,
    values: Vec<f64>,
    error: Option<NodeError>,
    output: Option<ModulationOutput>,
    inputs: Vec<ModulationInput>,
}

impl NodeBase {
    /// A leaf node created from factory path `path`.
    pub fn leaf(id: impl Into<String>, path: impl Into<String>, object: Box<dyn NodeObject>) -> Self {
        let parameters = object.parameters();
        let values = parameters.iter().map(|p| p.default).collect();
        Self {
            id: id.into(),
            path: path.into(),
            bypassed: false,
            body: NodeBody::Leaf(object),
            parameters,
            values,
            error: None,
            output: None,
            inputs: Vec::new(),
        }
    }

    /// A container node.
    pub fn container(id: impl Into<String>, kind: ContainerKind, children: Vec<NodeBase>) -> Self {
        Self {
            id: id.into(),
            path: kind.path(),
            bypassed: false,
            body: NodeBody::Container(Container::new(kind, children)),
            parameters: Vec::new(),
            values: Vec::new(),
            error: None,
            output: None,
            inputs: Vec::new(),
        }
    }

    /// Node id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Factory path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// What the node runs.
    pub fn body(&self) -> &NodeBody {
        &self.body
    }

    /// Whether the node is a container.
    pub fn is_container(&self) -> bool {
        matches!(self.body, NodeBody::Container(_))
    }

    /// Container routing, `None` for leaves.
    pub fn container_kind(&self) -> Option<ContainerKind> {
        match &self.body {
            NodeBody::Container(c) => Some(c.kind()),
            NodeBody::Leaf(_) => None,
        }
    }

    /// Child nodes, empty for leaves.
    pub fn children(&self) -> &[NodeBase] {
        match &self.body {
            NodeBody::Container(c) => c.children(),
            NodeBody::Leaf(_) => &[],
        }
    }

    /// The leaf object.
    pub fn object(&self) -> Option<&dyn NodeObject> {
        match &self.body {
            NodeBody::Leaf(obj) => Some(obj.as_ref()),
            NodeBody::Container(_) => None,
        }
    }

    /// Whether the node is bypassed.
    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Bypasses the node. A bypassed node passes audio through.
    pub fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    /// Error of the last prepare.
    pub fn error(&self) -> Option<NodeError> {
        self.error
    }

    /// Whether the node or one of its descendants keeps per-voice state.
    pub fn is_polyphonic(&self) -> bool {
        match &self.body {
            NodeBody::Leaf(obj) => obj.is_polyphonic(),
            NodeBody::Container(c) => c.children().iter().any(NodeBase::is_polyphonic),
        }
    }

    /// Parameter declarations.
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Index of the parameter called `name`.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Last value set for parameter `index`.
    pub fn parameter_value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Sets parameter `index`. Unknown indices are ignored.
    pub fn set_parameter(&mut self, index: usize, value: f64) {
        let Some(slot) = self.values.get_mut(index) else {
            return;
        };
        *slot = value;
        if let NodeBody::Leaf(obj) = &mut self.body {
            obj.set_parameter(index, value);
        }
    }

    /// Sets the parameter called `name`. Returns `false` if there is none.
    pub fn set_parameter_by_name(&mut self, name: &str, value: f64) -> bool {
        match self.parameter_index(name) {
            Some(i) => {
                self.set_parameter(i, value);
                true
            }
            None => false,
        }
    }

    /// Number of data slots of `data_type` the node reads.
    pub fn data_slots(&self, data_type: DataType) -> usize {
        match &self.body {
            NodeBody::Leaf(obj) => obj.data_slots(data_type),
            NodeBody::Container(_) => 0,
        }
    }

    /// Binds data slot `index` of the leaf object.
    pub fn set_external_data(&mut self, data: &ExternalData, index: usize) -> Result<(), NodeError> {
        match &mut self.body {
            NodeBody::Leaf(obj) => obj.set_external_data(data, index),
            NodeBody::Container(_) => Ok(()),
        }
    }

    /// Publishes the node's modulation values into `output`.
    pub fn set_modulation_output(&mut self, output: ModulationOutput) {
        self.output = Some(output);
    }

    /// Drives a parameter from a modulation slot.
    pub fn add_modulation_input(&mut self, input: ModulationInput) {
        self.inputs.push(input);
    }

    /// Whether the node publishes modulation values.
    pub fn has_modulation_output(&self) -> bool {
        self.output.is_some()
    }

    /// Removes all modulation routing of this node.
    pub fn clear_modulation(&mut self) {
        self.output = None;
        self.inputs.clear();
    }

    /// Node with `id` in this subtree.
    pub fn find(&self, id: &str) -> Option<&NodeBase> {
        if self.id == id {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(id))
    }

    /// Mutable node with `id` in this subtree.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut NodeBase> {
        if self.id == id {
            return Some(self);
        }
        match &mut self.body {
            NodeBody::Container(c) => c.children_mut().iter_mut().find_map(|n| n.find_mut(id)),
            NodeBody::Leaf(_) => None,
        }
    }

    /// Visits the subtree depth-first, parents before children.
    pub fn walk(&self, f: &mut dyn FnMut(&NodeBase)) {
        f(self);
        for c in self.children() {
            c.walk(f);
        }
    }

    /// Mutable depth-first visit, parents before children.
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut NodeBase)) {
        f(self);
        if let NodeBody::Container(c) = &mut self.body {
            for n in c.children_mut() {
                n.walk_mut(f);
            }
        }
    }

    /// Ids of the subtree in depth-first order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.walk(&mut |n| ids.push(n.id.clone()));
        ids
    }

    /// Prepares the subtree.
    ///
    /// Errors are recorded for the failing node in `ctx.handler`; the walk
    /// continues with the remaining nodes.
    pub fn prepare(&mut self, specs: &PrepareSpecs, ctx: &mut PrepareContext<'_>) {
        ctx.handler.remove_error(Some(&self.id), None);
        let result = match &mut self.body {
            NodeBody::Leaf(obj) => obj
                .requirements()
                .check(specs, ctx.in_frame)
                .and_then(|()| obj.prepare(specs)),
            NodeBody::Container(c) => c.prepare(specs, ctx),
        };

        self.error = result.err();
        if let Some(e) = self.error {
            tracing::debug!(node = %self.id, error = %e, "node failed to prepare");
            ctx.handler.add_error(&self.id, e);
            return;
        }

        // replay values onto objects that were rebuilt during prepare
        if let NodeBody::Leaf(obj) = &mut self.body {
            for (i, v) in self.values.iter().enumerate() {
                obj.set_parameter(i, *v);
            }
        }
    }

    #[inline]
    fn is_active(&self) -> bool {
        !self.bypassed && self.error.is_none()
    }

    #[inline]
    fn poll_modulation(&mut self) {
        for i in 0..self.inputs.len() {
            if let Some(v) = self.inputs[i].poll() {
                let p = self.inputs[i].parameter;
                if let Some(spec) = self.parameters.get(p) {
                    let value = spec.range.denormalize(v);
                    self.set_parameter(p, value);
                }
            }
        }
    }

    #[inline]
    fn publish_modulation(&mut self) {
        if let NodeBody::Leaf(obj) = &mut self.body {
            if let Some(v) = obj.handle_modulation() {
                if let Some(out) = &self.output {
                    out.bus.write(out.slot, v);
                }
            }
        }
    }

    /// Processes a block in place.
    pub fn process(&mut self, data: &mut ProcessData<'_>) {
        if !self.is_active() {
            return;
        }
        self.poll_modulation();
        match &mut self.body {
            NodeBody::Leaf(obj) => obj.process(data),
            NodeBody::Container(c) => c.process(data),
        }
        self.publish_modulation();
    }

    /// Processes one frame in place.
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        if !self.is_active() {
            return;
        }
        self.poll_modulation();
        match &mut self.body {
            NodeBody::Leaf(obj) => obj.process_frame(frame),
            NodeBody::Container(c) => c.process_frame(frame),
        }
        self.publish_modulation();
    }

    /// Clears the state of the subtree.
    pub fn reset(&mut self) {
        match &mut self.body {
            NodeBody::Leaf(obj) => obj.reset(),
            NodeBody::Container(c) => c.reset(),
        }
    }

    /// Forwards an event to the subtree.
    pub fn handle_hise_event(&mut self, event: &mut HiseEvent) {
        if !self.is_active() {
            return;
        }
        match &mut self.body {
            NodeBody::Leaf(obj) => obj.handle_hise_event(event),
            NodeBody::Container(c) => c.handle_hise_event(event),
        }
    }
}
