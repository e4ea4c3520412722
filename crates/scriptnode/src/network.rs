//! The DSP network: a node tree built from a description.
//!
//! A [`DspNetwork`] keeps two views of itself:
//!
//! - the **description** ([`NetworkTree`]) plus a pool of created but unused
//!   nodes, edited by the control thread
//! - the **live tree** ([`NodeBase`]) that renders audio
//!
//! Every structural edit is applied to a copy of the description, the
//! replacement tree is built and prepared without holding the audio lock and
//! swapped in afterwards. If building fails the edit is discarded and the old
//! tree keeps running.
//!
//! ```rust
//! use scriptnode::{DspNetwork, NetworkContext};
//! use scriptnode_config::{NetworkTree, NodeTree, ParameterTree};
//! use snex_core::AudioBuffer;
//!
//! let tree = NetworkTree::new("main")
//!     .with_parameter(ParameterTree::new("Offset", 0.0).with_connection("add", "Value"))
//!     .with_root(NodeTree::new("container.chain", "main").with_child(NodeTree::new("math.add", "add")));
//!
//! let network = DspNetwork::new(tree, NetworkContext::default()).unwrap();
//! network.prepare_to_play(44100.0, 4);
//! network.set_network_parameter(0, 0.25);
//!
//! let mut buffer = AudioBuffer::new(2, 4);
//! network.process(&mut buffer.as_process_data());
//! assert_eq!(buffer.channel(0), &[0.25; 4]);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use scriptnode_config::{
    Connection, NetworkTree, NodeTree, ParameterTree, check_before_compilation, check_if_deprecated, validate_network,
    validate_node,
};
use scriptnode_nodes::{
    ContainerKind, ModulationBus, ModulationInput, ModulationOutput, NodeBase, PrepareContext, voice_specs,
};
use scriptnode_registry::{NodeRegistry, RegistryError};
use snex_core::{
    DEFAULT_NUM_VOICES, DataHolder, DataType, DeprecationId, ErrorCode, EventType, ExceptionHandler, ExternalData,
    HiseEvent, NodeError, NodeObject, ParameterRange, ParameterSpec, PolyHandler, PrepareSpecs, ProcessData,
    VoiceAllocator, VoiceSetter,
};

use crate::error::NetworkError;
use crate::library::ProjectLibrary;

/// Channel count used by [`DspNetwork::prepare_to_play`] before the network
/// was prepared with explicit specs.
pub const DEFAULT_NUM_CHANNELS: usize = 2;

/// Undo steps kept per network.
pub const MAX_UNDO_STEPS: usize = 64;

/// What networks are built with.
#[derive(Clone, Default)]
pub struct NetworkContext {
    /// Node factories.
    pub registry: Arc<NodeRegistry>,
    /// Compiled nodes for freezing.
    pub library: Option<Arc<dyn ProjectLibrary>>,
    /// Shared data slots; every network gets its own holder if `None`.
    pub data: Option<Arc<DataHolder>>,
}

impl fmt::Debug for NetworkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkContext")
            .field("registry", &self.registry)
            .field("library", &self.library.as_ref().map(|l| l.num_nodes()))
            .field("data", &self.data.is_some())
            .finish()
    }
}

impl NetworkContext {
    /// A context with `registry` and no library.
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            library: None,
            data: None,
        }
    }

    /// Sets the project library.
    pub fn with_library(mut self, library: Arc<dyn ProjectLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Shares `data` between every network built with this context.
    pub fn with_data(mut self, data: Arc<DataHolder>) -> Self {
        self.data = Some(data);
        self
    }
}

// ============================================================================
// Description side
// ============================================================================

/// The editable part of a network: its description and the unused nodes.
#[derive(Debug, Clone, PartialEq)]
struct Structure {
    tree: NetworkTree,
    unused: Vec<NodeTree>,
}

impl Structure {
    fn find(&self, id: &str) -> Option<&NodeTree> {
        self.tree
            .find(id)
            .or_else(|| self.unused.iter().find_map(|n| n.find(id)))
    }

    fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Removes `id` from the pool or the tree. The root stays.
    fn take(&mut self, id: &str) -> Option<NodeTree> {
        if let Some(pos) = self.unused.iter().position(|n| n.id == id) {
            return Some(self.unused.remove(pos));
        }
        if let Some(node) = self.unused.iter_mut().find_map(|n| n.remove(id)) {
            return Some(node);
        }
        self.tree.root.remove(id)
    }

    /// Copy of `node` whose ids don't clash with any existing id.
    fn with_fresh_ids(&self, node: &NodeTree) -> NodeTree {
        let mut copy = node.clone();
        let mut assigned: BTreeSet<String> = BTreeSet::new();
        copy.rename_ids(&mut |id| {
            let fresh = non_existent_id(id, |c| self.contains(c) || assigned.contains(c));
            assigned.insert(fresh.clone());
            fresh
        });
        copy
    }
}

#[derive(Debug, Default)]
struct UndoStack {
    enabled: bool,
    undo: Vec<Structure>,
    redo: Vec<Structure>,
}

impl UndoStack {
    fn push(&mut self, state: Structure) {
        if !self.enabled {
            return;
        }
        self.undo.push(state);
        if self.undo.len() > MAX_UNDO_STEPS {
            self.undo.remove(0);
        }
        self.redo.clear();
    }
}

#[derive(Debug)]
struct Control {
    state: Structure,
    selection: Vec<String>,
    undo: UndoStack,
    specs: Option<PrepareSpecs>,
    debugged: BTreeSet<String>,
}

/// `id`, or `id` with the next free numeric suffix.
///
/// `gain` becomes `gain1`, `gain1` becomes `gain2`.
pub fn non_existent_id(id: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(id) {
        return id.to_string();
    }
    let base = id.trim_end_matches(|c: char| c.is_ascii_digit());
    let mut n: u64 = id[base.len()..].parse().unwrap_or(0);
    while let Some(next) = n.checked_add(1) {
        n = next;
        let candidate = format!("{base}{n}");
        if !is_taken(&candidate) {
            return candidate;
        }
    }
    // Suffix space exhausted: start a new counter after the full id.
    non_existent_id(&format!("{id}_1"), is_taken)
}

/// Id a node gets when none is given: the last segment of its path.
fn default_id(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

/// Drops every connection that points at one of `ids`.
fn disconnect(node: &mut NodeTree, ids: &BTreeSet<String>) {
    node.modulation.retain(|c| !ids.contains(&c.node));
    for p in &mut node.parameters {
        p.connections.retain(|c| !ids.contains(&c.node));
    }
    for c in &mut node.nodes {
        disconnect(c, ids);
    }
}

// ============================================================================
// Live side
// ============================================================================

#[derive(Debug)]
struct ParameterTarget {
    node: String,
    index: usize,
    range: ParameterRange,
}

#[derive(Debug)]
struct NetworkParameter {
    id: String,
    range: ParameterRange,
    targets: Vec<ParameterTarget>,
}

/// A data binding that clashed with the tree being replaced.
#[derive(Debug)]
struct PendingData {
    node: String,
    data: ExternalData,
    slot: usize,
}

struct Live {
    root: NodeBase,
    /// Reads the modulation value of the root's last child.
    output: Option<ModulationInput>,
    exceptions: ExceptionHandler,
    binding_errors: Vec<(String, NodeError)>,
    parameters: Vec<NetworkParameter>,
    values: Vec<f64>,
    frozen: Option<Box<dyn NodeObject>>,
    initialised: bool,
    /// Voice context of the last prepare, `None` when monophonic.
    voices: Option<Arc<PolyHandler>>,
    allocator: VoiceAllocator,
}

impl fmt::Debug for Live {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Live")
            .field("root", &self.root.id())
            .field("values", &self.values)
            .field("frozen", &self.frozen.is_some())
            .field("initialised", &self.initialised)
            .field("voices", &self.allocator.active().count())
            .finish()
    }
}

impl Live {
    fn set_parameter(&mut self, index: usize, value: f64) {
        let Some(p) = self.parameters.get(index) else {
            return;
        };
        let value = p.range.clamp(value);
        self.values[index] = value;

        if let Some(frozen) = &mut self.frozen {
            frozen.set_parameter(index, value);
            return;
        }
        for t in &p.targets {
            if let Some(node) = self.root.find_mut(&t.node) {
                node.set_parameter(t.index, t.range.convert_from(&p.range, value));
            }
        }
    }

    fn dispatch_all(&mut self) {
        for i in 0..self.values.len() {
            self.set_parameter(i, self.values[i]);
        }
    }

    fn prepare(&mut self, network: &str, specs: &PrepareSpecs) {
        self.root.prepare(specs, &mut PrepareContext::new(&mut self.exceptions));
        if let Some(frozen) = &mut self.frozen {
            match frozen.prepare(specs) {
                Ok(()) => {
                    for (i, v) in self.values.iter().enumerate() {
                        frozen.set_parameter(i, *v);
                    }
                }
                Err(e) => self.exceptions.add_error(network, e),
            }
        }
        for (node, e) in &self.binding_errors {
            self.exceptions.add_error(node, *e);
        }
        self.voices = specs.voice_index.clone().filter(|h| h.is_polyphonic());
        if let Some(handler) = &self.voices {
            if self.allocator.num_voices() != handler.num_voices() {
                self.allocator = VoiceAllocator::new(handler.num_voices());
            }
        }
        self.initialised = specs.block_size > 0;
    }

    fn record_binding(&mut self, node: &str, result: Result<(), NodeError>) {
        self.binding_errors.retain(|(id, _)| id != node);
        self.exceptions.remove_error(Some(node), Some(ErrorCode::RingBufferMultipleWriters));
        if let Err(e) = result {
            self.exceptions.add_error(node, e);
            self.binding_errors.push((node.to_string(), e));
        }
    }

    fn bind_pending(&mut self, pending: Vec<PendingData>) {
        for p in pending {
            let result = match self.root.find_mut(&p.node) {
                Some(node) => node.set_external_data(&p.data, p.slot),
                None => Ok(()),
            };
            self.record_binding(&p.node, result);
        }
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        if !self.initialised {
            return;
        }
        match &mut self.frozen {
            Some(f) => f.process(data),
            None => self.root.process(data),
        }
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        if !self.initialised {
            return;
        }
        match &mut self.frozen {
            Some(f) => f.process_frame(frame),
            None => self.root.process_frame(frame),
        }
    }

    fn process_voice(&mut self, voice: usize, data: &mut ProcessData<'_>) {
        match self.voices.clone() {
            Some(handler) if voice < handler.num_voices() => {
                let _voice = VoiceSetter::new(&handler, voice);
                self.process(data);
            }
            _ => self.process(data),
        }
    }

    /// Forwards `event`, inside the voice it starts or ends.
    ///
    /// Note-ons get a voice from the allocator, note-offs end the voice of
    /// their note-on; a note-off without a voice is dropped. Inside a voice
    /// of an outer network the event is forwarded as is.
    fn handle_hise_event(&mut self, event: &mut HiseEvent) -> Option<usize> {
        if !self.initialised {
            return None;
        }
        let Some(handler) = self.voices.clone() else {
            self.dispatch_event(event);
            return None;
        };
        if let Some(voice) = handler.current_voice() {
            self.dispatch_event(event);
            return Some(voice);
        }

        let voice = match event.kind {
            EventType::NoteOn => Some(self.allocator.start(event)),
            EventType::NoteOff => Some(self.allocator.stop(event)?),
            EventType::AllNotesOff => {
                self.allocator.clear();
                None
            }
            _ => None,
        };
        match voice {
            Some(v) => {
                let _voice = VoiceSetter::new(&handler, v);
                self.dispatch_event(event);
            }
            None => self.dispatch_event(event),
        }
        voice
    }

    fn dispatch_event(&mut self, event: &mut HiseEvent) {
        match &mut self.frozen {
            Some(f) => f.handle_hise_event(event),
            None => self.root.handle_hise_event(event),
        }
    }

    fn reset(&mut self) {
        match &mut self.frozen {
            Some(f) => f.reset(),
            None => self.root.reset(),
        }
    }

    fn handle_modulation(&mut self) -> Option<f64> {
        match &mut self.frozen {
            Some(f) => f.handle_modulation(),
            None => self.output.as_mut().and_then(ModulationInput::poll),
        }
    }
}

fn unknown_parameter(node: &str, parameter: &str) -> NetworkError {
    NetworkError::UnknownParameter {
        node: node.to_string(),
        parameter: parameter.to_string(),
    }
}

/// Connects modulation sources to their targets.
///
/// Every node with modulation targets gets one bus slot. The root's last
/// child, if it is a leaf, also publishes into a slot the network reads as
/// its own modulation value.
fn wire_modulation(tree: &NetworkTree, root: &mut NodeBase) -> Result<Option<ModulationInput>, NetworkError> {
    let sources: Vec<&NodeTree> = tree.nodes().filter(|n| !n.modulation.is_empty()).collect();
    let last = tree
        .root
        .nodes
        .last()
        .filter(|n| ContainerKind::from_path(&n.path).is_none());
    let last_slot = last.map(|n| {
        sources
            .iter()
            .position(|s| s.id == n.id)
            .unwrap_or(sources.len())
    });
    let num_slots = sources.len() + usize::from(last_slot == Some(sources.len()));
    let bus = ModulationBus::new(num_slots);

    for (slot, source) in sources.iter().enumerate() {
        if let Some(node) = root.find_mut(&source.id) {
            node.set_modulation_output(ModulationOutput {
                bus: Arc::clone(&bus),
                slot,
            });
        }
        for c in &source.modulation {
            let target = root
                .find_mut(&c.node)
                .ok_or_else(|| NetworkError::UnknownNode(c.node.clone()))?;
            let index = target
                .parameter_index(&c.parameter)
                .ok_or_else(|| unknown_parameter(&c.node, &c.parameter))?;
            target.add_modulation_input(ModulationInput::new(Arc::clone(&bus), slot, index));
        }
    }

    let (Some(last), Some(slot)) = (last, last_slot) else {
        return Ok(None);
    };
    if slot == sources.len() {
        if let Some(node) = root.find_mut(&last.id) {
            node.set_modulation_output(ModulationOutput {
                bus: Arc::clone(&bus),
                slot,
            });
        }
    }
    Ok(Some(ModulationInput::new(bus, slot, 0)))
}

fn resolve_parameters(tree: &NetworkTree, root: &NodeBase) -> Result<Vec<NetworkParameter>, NetworkError> {
    tree.parameters
        .iter()
        .map(|p| {
            let targets = p
                .connections
                .iter()
                .map(|c| {
                    let node = root
                        .find(&c.node)
                        .ok_or_else(|| NetworkError::UnknownNode(c.node.clone()))?;
                    let index = node
                        .parameter_index(&c.parameter)
                        .ok_or_else(|| unknown_parameter(&c.node, &c.parameter))?;
                    let range = node.parameters().get(index).map(|s| s.range).unwrap_or_default();
                    Ok(ParameterTarget {
                        node: c.node.clone(),
                        index,
                        range,
                    })
                })
                .collect::<Result<Vec<_>, NetworkError>>()?;
            Ok(NetworkParameter {
                id: p.id.clone(),
                range: p.range,
                targets,
            })
        })
        .collect()
}

/// Copies embedded content into a data object.
fn fill(data: &ExternalData, values: &[f32]) {
    if let Some(table) = data.as_table() {
        table.set_values(values.to_vec());
    } else if let Some(pack) = data.as_slider_pack() {
        for (i, v) in values.iter().enumerate() {
            pack.set_value(i, *v);
        }
    }
}

/// Binds the data slots of every node.
///
/// Bindings refused because another writer holds a display buffer are
/// returned; they are retried once the previous tree is gone.
fn bind_data(tree: &NetworkTree, root: &mut NodeBase, holder: &DataHolder, live_errors: &mut Vec<(String, NodeError)>) -> Vec<PendingData> {
    let mut pending = Vec::new();
    for node in tree.nodes() {
        let Some(target) = root.find_mut(&node.id) else {
            continue;
        };
        let mut positions = [0usize; 4];
        for slot in &node.data {
            let position = positions[slot.data_type.index()];
            positions[slot.data_type.index()] += 1;

            let data = holder.get_or_create(slot.data_type, slot.index);
            if let Some(values) = &slot.values {
                fill(&data, values);
            }
            if let Err(e) = target.set_external_data(&data, position) {
                if e.code == ErrorCode::RingBufferMultipleWriters {
                    pending.push(PendingData {
                        node: node.id.clone(),
                        data,
                        slot: position,
                    });
                } else {
                    live_errors.push((node.id.clone(), e));
                }
            }
        }
    }
    pending
}

struct Builder<'a> {
    registry: &'a NodeRegistry,
    data: &'a DataHolder,
    polyphonic: bool,
}

impl Builder<'_> {
    fn build(&self, tree: &NetworkTree, specs: Option<&PrepareSpecs>) -> Result<(Live, Vec<PendingData>), NetworkError> {
        validate_network(tree)?;
        let mut root = self.registry.build(&tree.root, self.polyphonic)?;
        let output = wire_modulation(tree, &mut root)?;
        let parameters = resolve_parameters(tree, &root)?;

        let mut exceptions = ExceptionHandler::new();
        for node in tree.nodes() {
            let id = check_if_deprecated(node);
            if id != DeprecationId::Ok {
                tracing::warn!(network = %tree.id, node = %node.id, deprecation = %id, "deprecated node");
                exceptions.add_error(&node.id, NodeError::deprecated(id));
            }
        }

        let mut binding_errors = Vec::new();
        let pending = bind_data(tree, &mut root, self.data, &mut binding_errors);
        for (node, e) in &binding_errors {
            exceptions.add_error(node, *e);
        }

        let mut live = Live {
            root,
            output,
            exceptions,
            binding_errors,
            parameters,
            values: tree.parameters.iter().map(|p| p.value).collect(),
            frozen: None,
            initialised: false,
            voices: None,
            allocator: VoiceAllocator::default(),
        };
        live.dispatch_all();
        if let Some(specs) = specs {
            live.prepare(&tree.id, specs);
        }
        Ok((live, pending))
    }
}

// ============================================================================
// DspNetwork
// ============================================================================

/// A node tree built from a description, with freeze, selection and undo.
///
/// All methods take `&self`: audio callbacks lock the live tree only, control
/// methods lock the description first and the live tree briefly after.
pub struct DspNetwork {
    id: String,
    polyphonic: bool,
    context: NetworkContext,
    data: Arc<DataHolder>,
    voices: Arc<PolyHandler>,
    parent: RwLock<Weak<DspNetwork>>,
    control: Mutex<Control>,
    live: Mutex<Live>,
}

impl fmt::Debug for DspNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DspNetwork")
            .field("id", &self.id)
            .field("polyphonic", &self.polyphonic)
            .field("live", &*self.live.lock())
            .finish()
    }
}

impl DspNetwork {
    /// Builds a network from its description.
    ///
    /// # Errors
    ///
    /// Fails if the description is invalid, names unknown nodes or
    /// parameters, or connects to nodes that don't exist.
    pub fn new(tree: NetworkTree, context: NetworkContext) -> Result<Self, NetworkError> {
        let data = context.data.clone().unwrap_or_default();
        let builder = Builder {
            registry: &context.registry,
            data: &data,
            polyphonic: tree.polyphonic,
        };
        let (mut live, pending) = builder.build(&tree, None)?;
        live.bind_pending(pending);
        tracing::debug!(network = %tree.id, nodes = tree.nodes().count(), "built network");

        Ok(Self {
            id: tree.id.clone(),
            polyphonic: tree.polyphonic,
            context,
            data,
            voices: Arc::new(PolyHandler::new(DEFAULT_NUM_VOICES)),
            parent: RwLock::new(Weak::new()),
            control: Mutex::new(Control {
                state: Structure {
                    tree,
                    unused: Vec::new(),
                },
                selection: Vec::new(),
                undo: UndoStack::default(),
                specs: None,
                debugged: BTreeSet::new(),
            }),
            live: Mutex::new(live),
        })
    }

    /// Network id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the network renders voices.
    pub fn is_polyphonic(&self) -> bool {
        self.polyphonic
    }

    /// Data slots of the network.
    pub fn data(&self) -> &Arc<DataHolder> {
        &self.data
    }

    /// Context the network was built with.
    pub fn context(&self) -> &NetworkContext {
        &self.context
    }

    /// Current description, network parameter values included.
    pub fn description(&self) -> NetworkTree {
        let mut control = self.control.lock();
        self.sync_values(&mut control);
        control.state.tree.clone()
    }

    /// Structural hash of the current description.
    pub fn content_hash(&self) -> u64 {
        self.control.lock().state.tree.content_hash()
    }

    /// Checks the description for deprecated nodes.
    pub fn check_before_compilation(&self) -> Result<(), NetworkError> {
        check_before_compilation(&self.control.lock().state.tree)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Specs the network was last prepared with.
    pub fn specs(&self) -> Option<PrepareSpecs> {
        self.control.lock().specs.clone()
    }

    /// Whether the network was prepared with a non-zero block size.
    pub fn is_initialised(&self) -> bool {
        self.live.lock().initialised
    }

    /// Prepares the live tree depth-first.
    ///
    /// Node failures are recorded in the exception handler; the failing
    /// nodes are skipped while processing.
    pub fn prepare(&self, specs: &PrepareSpecs) {
        let specs = self.network_specs(specs);
        let mut control = self.control.lock();
        control.specs = Some(specs.clone());
        let mut live = self.live.lock();
        live.prepare(&self.id, &specs);
        tracing::debug!(
            network = %self.id,
            sample_rate = specs.sample_rate,
            block_size = specs.block_size,
            errors = live.exceptions.len(),
            "prepared network"
        );
    }

    /// Prepares with the channel count of the last prepare call.
    pub fn prepare_to_play(&self, sample_rate: f64, block_size: usize) {
        let channels = self
            .control
            .lock()
            .specs
            .as_ref()
            .map_or(DEFAULT_NUM_CHANNELS, |s| s.num_channels);
        self.prepare(&PrepareSpecs::new(sample_rate, block_size, channels));
    }

    fn network_specs(&self, specs: &PrepareSpecs) -> PrepareSpecs {
        if self.polyphonic && specs.voice_index.is_none() {
            return specs.clone().with_poly_handler(self.voice_handler());
        }
        voice_specs(specs, self.polyphonic)
    }

    /// Processes a block. Does nothing before the network is prepared.
    pub fn process(&self, data: &mut ProcessData<'_>) {
        self.live.lock().process(data);
    }

    /// Processes one frame.
    pub fn process_frame(&self, frame: &mut [f32]) {
        self.live.lock().process_frame(frame);
    }

    /// Processes a block for one voice of a polyphonic network.
    ///
    /// Out-of-range voices and monophonic networks process without a voice
    /// context.
    pub fn process_voice(&self, voice: usize, data: &mut ProcessData<'_>) {
        self.live.lock().process_voice(voice, data);
    }

    /// Forwards an event.
    ///
    /// In a polyphonic network a note-on starts a voice and a note-off ends
    /// the voice of its note-on; the event reaches the nodes inside that
    /// voice. Returns the voice, `None` for events without one.
    pub fn handle_hise_event(&self, event: &mut HiseEvent) -> Option<usize> {
        self.live.lock().handle_hise_event(event)
    }

    /// Voices with a sounding note.
    pub fn active_voices(&self) -> Vec<usize> {
        self.live.lock().allocator.active().collect()
    }

    /// Clears the processing state.
    pub fn reset(&self) {
        self.live.lock().reset();
    }

    /// Modulation value published since the last call.
    pub fn handle_modulation(&self) -> Option<f64> {
        self.live.lock().handle_modulation()
    }

    // ------------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------------

    /// Copy of the exception handler.
    pub fn exceptions(&self) -> ExceptionHandler {
        self.live.lock().exceptions.clone()
    }

    /// Error recorded for `node`.
    pub fn error(&self, node: &str) -> Option<NodeError> {
        self.live.lock().exceptions.error(node)
    }

    // ------------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------------

    fn sync_values(&self, control: &mut Control) {
        let live = self.live.lock();
        for (p, v) in control.state.tree.parameters.iter_mut().zip(&live.values) {
            p.value = *v;
        }
    }

    fn builder(&self) -> Builder<'_> {
        Builder {
            registry: &self.context.registry,
            data: &self.data,
            polyphonic: self.polyphonic,
        }
    }

    /// Replaces the description, rebuilding the live tree if it changed.
    fn commit(&self, control: &mut Control, next: Structure, record: bool) -> Result<(), NetworkError> {
        if next == control.state {
            return Ok(());
        }
        if next.tree != control.state.tree {
            let (live, pending) = self.builder().build(&next.tree, control.specs.as_ref())?;
            self.swap_live(live, pending);
        }
        if record {
            let previous = std::mem::replace(&mut control.state, next);
            control.undo.push(previous);
        } else {
            control.state = next;
        }
        let state = &control.state;
        control.selection.retain(|id| state.contains(id));
        Ok(())
    }

    fn swap_live(&self, mut next: Live, pending: Vec<PendingData>) {
        let previous = {
            let mut live = self.live.lock();
            next.frozen = live.frozen.take();
            if next.allocator.num_voices() == live.allocator.num_voices() {
                std::mem::swap(&mut next.allocator, &mut live.allocator);
            }
            std::mem::replace(&mut *live, next)
        };
        drop(previous);

        if !pending.is_empty() {
            self.live.lock().bind_pending(pending);
        }
        tracing::debug!(network = %self.id, "swapped live tree");
    }

    fn edit<R>(&self, f: impl FnOnce(&mut Structure) -> Result<R, NetworkError>) -> Result<R, NetworkError> {
        let mut control = self.control.lock();
        self.sync_values(&mut control);
        let mut next = control.state.clone();
        let result = f(&mut next)?;
        self.commit(&mut control, next, true)?;
        Ok(result)
    }

    /// Id that is not used by any node: `id` itself or `id` with a numeric
    /// suffix.
    pub fn get_non_existent_id(&self, id: &str) -> String {
        let control = self.control.lock();
        non_existent_id(id, |c| control.state.contains(c))
    }

    /// Creates an unused node of `path`.
    ///
    /// If a node with `id` and the same path exists it is reused. Otherwise
    /// the id is made unique; without an id the last path segment is used.
    /// Returns the id of the node.
    pub fn create(&self, path: &str, id: Option<&str>) -> Result<String, NetworkError> {
        if !self.context.registry.contains(path) {
            return Err(RegistryError::UnknownPath(path.to_string()).into());
        }
        let wanted = id.unwrap_or_else(|| default_id(path)).to_string();
        self.edit(|s| {
            if s.find(&wanted).is_some_and(|n| n.path == path) {
                return Ok(wanted);
            }
            let id = non_existent_id(&wanted, |c| s.contains(c));
            s.unused.push(NodeTree::new(path, id.clone()));
            Ok(id)
        })
    }

    /// Creates an unused subtree from a description.
    ///
    /// An existing node with the same id and path is reused; otherwise
    /// clashing ids in the subtree are made unique. Returns the id of the
    /// subtree root.
    pub fn create_from_description(&self, node: &NodeTree) -> Result<String, NetworkError> {
        validate_node(node)?;
        if let Some(n) = node.iter().find(|n| !self.context.registry.contains(&n.path)) {
            return Err(RegistryError::UnknownPath(n.path.clone()).into());
        }
        self.edit(|s| {
            if s.find(&node.id).is_some_and(|n| n.path == node.path) {
                return Ok(node.id.clone());
            }
            let copy = s.with_fresh_ids(node);
            let id = copy.id.clone();
            s.unused.push(copy);
            Ok(id)
        })
    }

    /// Duplicates the subtree of `id` into the unused pool with new ids.
    pub fn clone_with_new_ids(&self, id: &str) -> Result<String, NetworkError> {
        self.edit(|s| {
            let node = s.find(id).ok_or_else(|| NetworkError::UnknownNode(id.to_string()))?;
            let copy = s.with_fresh_ids(node);
            let new_id = copy.id.clone();
            s.unused.push(copy);
            Ok(new_id)
        })
    }

    /// Description of node `id`, used or unused.
    pub fn get(&self, id: &str) -> Option<NodeTree> {
        self.control.lock().state.find(id).cloned()
    }

    /// Whether a node with `id` exists, used or unused.
    pub fn contains(&self, id: &str) -> bool {
        self.control.lock().state.contains(id)
    }

    /// Moves node `id` into container `parent` at `index`.
    ///
    /// The node may come from the unused pool or from elsewhere in the
    /// tree.
    pub fn add_node(&self, id: &str, parent: &str, index: usize) -> Result<(), NetworkError> {
        self.edit(|s| {
            if s.tree.root.id == id {
                return Err(NetworkError::RootNode(id.to_string()));
            }
            let parent_path = s
                .tree
                .find(parent)
                .map(|p| p.path.clone())
                .ok_or_else(|| NetworkError::UnknownNode(parent.to_string()))?;
            if ContainerKind::from_path(&parent_path).is_none() {
                return Err(NetworkError::NotAContainer(parent.to_string()));
            }
            let node = s.take(id).ok_or_else(|| NetworkError::UnknownNode(id.to_string()))?;
            // parent gone: it was inside the moved subtree
            if !s.tree.root.insert(parent, index, node) {
                return Err(NetworkError::UnknownNode(parent.to_string()));
            }
            Ok(())
        })
    }

    /// Moves node `id` from the tree to the unused pool.
    ///
    /// Connections into the removed subtree are dropped.
    pub fn remove_node(&self, id: &str) -> Result<(), NetworkError> {
        self.edit(|s| {
            if s.tree.root.id == id {
                return Err(NetworkError::RootNode(id.to_string()));
            }
            let node = s
                .tree
                .root
                .remove(id)
                .ok_or_else(|| NetworkError::UnknownNode(id.to_string()))?;
            let removed: BTreeSet<String> = node.ids().into_iter().map(str::to_string).collect();
            disconnect(&mut s.tree.root, &removed);
            for p in &mut s.tree.parameters {
                p.connections.retain(|c| !removed.contains(&c.node));
            }
            s.unused.push(node);
            Ok(())
        })
    }

    /// Deletes node `id` if it sits in the unused pool.
    pub fn delete_if_unused(&self, id: &str) -> bool {
        self.edit(|s| match s.unused.iter().position(|n| n.id == id) {
            Some(pos) => {
                s.unused.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        })
        .unwrap_or(false)
    }

    /// Ids of the nodes in the tree, depth-first.
    pub fn used_node_ids(&self) -> Vec<String> {
        let control = self.control.lock();
        control.state.tree.root.ids().into_iter().map(str::to_string).collect()
    }

    /// Ids of the nodes in the unused pool.
    pub fn unused_node_ids(&self) -> Vec<String> {
        let control = self.control.lock();
        control
            .state
            .unused
            .iter()
            .flat_map(|n| n.ids())
            .map(str::to_string)
            .collect()
    }

    /// Sets a node parameter and records it in the description.
    pub fn set_node_parameter(&self, node: &str, parameter: &str, value: f64) -> Result<(), NetworkError> {
        let mut control = self.control.lock();
        let description = control
            .state
            .tree
            .find_mut(node)
            .ok_or_else(|| NetworkError::UnknownNode(node.to_string()))?;
        {
            let mut live = self.live.lock();
            let target = live
                .root
                .find_mut(node)
                .ok_or_else(|| NetworkError::UnknownNode(node.to_string()))?;
            let index = target
                .parameter_index(parameter)
                .ok_or_else(|| unknown_parameter(node, parameter))?;
            target.set_parameter(index, value);
        }
        match description.parameter_mut(parameter) {
            Some(p) => p.value = value,
            None => description.parameters.push(ParameterTree::new(parameter, value)),
        }
        Ok(())
    }

    /// Current value of a node parameter.
    pub fn node_parameter(&self, node: &str, parameter: &str) -> Option<f64> {
        let live = self.live.lock();
        let n = live.root.find(node)?;
        n.parameter_value(n.parameter_index(parameter)?)
    }

    /// Bypasses or enables node `id`.
    pub fn set_bypassed(&self, id: &str, bypassed: bool) -> Result<(), NetworkError> {
        let mut control = self.control.lock();
        let description = control
            .state
            .tree
            .find_mut(id)
            .ok_or_else(|| NetworkError::UnknownNode(id.to_string()))?;
        description.bypassed = bypassed;
        if let Some(node) = self.live.lock().root.find_mut(id) {
            node.set_bypassed(bypassed);
        }
        Ok(())
    }

    /// Marks `id` as attached to a node debugger. A network with a debugged
    /// node can't be frozen.
    ///
    /// # Errors
    ///
    /// Fails if there is no node `id`.
    pub fn set_node_debugged(&self, id: &str, debugged: bool) -> Result<(), NetworkError> {
        let mut control = self.control.lock();
        if !control.state.contains(id) {
            return Err(NetworkError::UnknownNode(id.to_string()));
        }
        if debugged {
            control.debugged.insert(id.to_string());
        } else {
            control.debugged.remove(id);
            self.live
                .lock()
                .exceptions
                .remove_error(Some(id), Some(ErrorCode::NodeDebuggerEnabled));
        }
        Ok(())
    }

    /// Whether `id` is attached to a node debugger.
    pub fn is_node_debugged(&self, id: &str) -> bool {
        self.control.lock().debugged.contains(id)
    }

    // ------------------------------------------------------------------------
    // Network parameters
    // ------------------------------------------------------------------------

    /// Ids of the network parameters in index order.
    pub fn parameter_ids(&self) -> Vec<String> {
        self.live.lock().parameters.iter().map(|p| p.id.clone()).collect()
    }

    /// Network parameters as node parameters, current values as defaults.
    pub fn parameter_specs(&self) -> Vec<ParameterSpec> {
        let live = self.live.lock();
        live.parameters
            .iter()
            .zip(&live.values)
            .map(|(p, v)| ParameterSpec::new(p.id.clone(), p.range, *v))
            .collect()
    }

    /// Sets network parameter `index`, clamped to its range.
    ///
    /// The value goes to the frozen node if the network is frozen, otherwise
    /// it is converted into the range of every connected node parameter.
    pub fn set_network_parameter(&self, index: usize, value: f64) {
        self.live.lock().set_parameter(index, value);
    }

    /// Sets a network parameter by id.
    pub fn set_network_parameter_by_id(&self, id: &str, value: f64) -> Result<(), NetworkError> {
        let mut live = self.live.lock();
        let index = live
            .parameters
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| NetworkError::UnknownNetworkParameter(id.to_string()))?;
        live.set_parameter(index, value);
        Ok(())
    }

    /// Connects network parameter `parameter` to `node.target`.
    ///
    /// Undoable. The live tree is rebuilt and receives the current value in
    /// one swap.
    ///
    /// # Errors
    ///
    /// Fails for an unknown network parameter, a node outside the tree or
    /// a node without `target`.
    pub fn connect_network_parameter(
        &self,
        parameter: &str,
        node: &str,
        target: &str,
    ) -> Result<(), NetworkError> {
        self.edit(|s| {
            if s.tree.root.find(node).is_none() {
                return Err(NetworkError::UnknownNode(node.to_string()));
            }
            let p = s
                .tree
                .parameters
                .iter_mut()
                .find(|p| p.id == parameter)
                .ok_or_else(|| NetworkError::UnknownNetworkParameter(parameter.to_string()))?;
            if !p.connections.iter().any(|c| c.node == node && c.parameter == target) {
                p.connections.push(Connection::new(node, target));
            }
            Ok(())
        })
    }

    /// Removes the connection from `parameter` to `node.target`. Undoable.
    pub fn disconnect_network_parameter(
        &self,
        parameter: &str,
        node: &str,
        target: &str,
    ) -> Result<(), NetworkError> {
        self.edit(|s| {
            let p = s
                .tree
                .parameters
                .iter_mut()
                .find(|p| p.id == parameter)
                .ok_or_else(|| NetworkError::UnknownNetworkParameter(parameter.to_string()))?;
            p.connections.retain(|c| c.node != node || c.parameter != target);
            Ok(())
        })
    }

    /// Current value of a network parameter.
    pub fn network_parameter(&self, id: &str) -> Option<f64> {
        let live = self.live.lock();
        let index = live.parameters.iter().position(|p| p.id == id)?;
        live.values.get(index).copied()
    }

    /// Sets network parameters from a JSON object of `id: number` pairs.
    ///
    /// Nothing is applied if any entry is invalid.
    pub fn set_parameter_data_from_json(&self, json: &str) -> Result<(), NetworkError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| NetworkError::ParameterData(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| NetworkError::ParameterData("expected an object".to_string()))?;

        let mut live = self.live.lock();
        let mut updates = Vec::with_capacity(object.len());
        for (id, v) in object {
            let index = live
                .parameters
                .iter()
                .position(|p| &p.id == id)
                .ok_or_else(|| NetworkError::UnknownNetworkParameter(id.clone()))?;
            let v = v
                .as_f64()
                .ok_or_else(|| NetworkError::ParameterData(format!("{id} is not a number")))?;
            updates.push((index, v));
        }
        for (index, v) in updates {
            live.set_parameter(index, v);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Adds `id` to the selection. Returns `false` for unknown nodes.
    pub fn select(&self, id: &str) -> bool {
        let mut control = self.control.lock();
        if !control.state.contains(id) {
            return false;
        }
        if !control.selection.iter().any(|s| s == id) {
            control.selection.push(id.to_string());
        }
        true
    }

    /// Removes `id` from the selection.
    pub fn deselect(&self, id: &str) {
        self.control.lock().selection.retain(|s| s != id);
    }

    /// Clears the selection.
    pub fn deselect_all(&self) {
        self.control.lock().selection.clear();
    }

    /// Selected ids in selection order.
    pub fn selection(&self) -> Vec<String> {
        self.control.lock().selection.clone()
    }

    /// Whether `id` is selected.
    pub fn is_selected(&self, id: &str) -> bool {
        self.control.lock().selection.iter().any(|s| s == id)
    }

    // ------------------------------------------------------------------------
    // Undo
    // ------------------------------------------------------------------------

    /// Turns undo recording on or off. Turning it off drops the history.
    pub fn set_undo_enabled(&self, enabled: bool) {
        let mut control = self.control.lock();
        control.undo.enabled = enabled;
        if !enabled {
            control.undo.undo.clear();
            control.undo.redo.clear();
        }
    }

    /// Whether structural edits are recorded.
    pub fn is_undo_enabled(&self) -> bool {
        self.control.lock().undo.enabled
    }

    /// Whether there is an edit to undo.
    pub fn can_undo(&self) -> bool {
        !self.control.lock().undo.undo.is_empty()
    }

    /// Whether there is an edit to redo.
    pub fn can_redo(&self) -> bool {
        !self.control.lock().undo.redo.is_empty()
    }

    /// Reverts the last structural edit. Returns `false` if there is none.
    pub fn undo(&self) -> Result<bool, NetworkError> {
        self.step(true)
    }

    /// Reapplies the last undone edit. Returns `false` if there is none.
    pub fn redo(&self) -> Result<bool, NetworkError> {
        self.step(false)
    }

    fn step(&self, backwards: bool) -> Result<bool, NetworkError> {
        let mut control = self.control.lock();
        self.sync_values(&mut control);
        let popped = if backwards {
            control.undo.undo.pop()
        } else {
            control.undo.redo.pop()
        };
        let Some(mut target) = popped else {
            return Ok(false);
        };
        // structure is restored, network parameter values are kept
        for p in &mut target.tree.parameters {
            if let Some(current) = control.state.tree.parameter(&p.id) {
                p.value = current.value;
            }
        }

        let current = control.state.clone();
        if let Err(e) = self.commit(&mut control, target.clone(), false) {
            if backwards {
                control.undo.undo.push(target);
            } else {
                control.undo.redo.push(target);
            }
            return Err(e);
        }
        if backwards {
            control.undo.redo.push(current);
        } else {
            control.undo.undo.push(current);
        }
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Freeze
    // ------------------------------------------------------------------------

    fn library_index(&self) -> Option<(&Arc<dyn ProjectLibrary>, usize)> {
        let library = self.context.library.as_ref()?;
        let index = library.index_of(&self.id)?;
        Some((library, index))
    }

    /// Whether the project library has a compiled node for this network.
    pub fn can_be_frozen(&self) -> bool {
        self.library_index().is_some()
    }

    /// Whether the compiled node was built from the current description.
    pub fn hash_matches(&self) -> bool {
        self.library_index()
            .and_then(|(library, index)| library.hash(index))
            .is_some_and(|hash| hash == self.content_hash())
    }

    /// Whether the compiled node drives audio.
    pub fn is_frozen(&self) -> bool {
        self.live.lock().frozen.is_some()
    }

    /// Switches between the interpreted tree and the compiled node.
    ///
    /// Network parameter values carry over in both directions.
    ///
    /// # Errors
    ///
    /// Freezing fails without a compiled node, while a node is debugged, if
    /// the description changed since compilation, or if the compiled node
    /// can't be prepared.
    pub fn set_frozen(&self, frozen: bool) -> Result<(), NetworkError> {
        if frozen == self.is_frozen() {
            return Ok(());
        }

        if !frozen {
            let previous = {
                let mut live = self.live.lock();
                let previous = live.frozen.take();
                live.dispatch_all();
                previous
            };
            drop(previous);
            tracing::info!(network = %self.id, "unfroze network");
            return Ok(());
        }

        let control = self.control.lock();
        let not_compiled = || NetworkError::NotCompiled(self.id.clone());
        let (library, index) = self.library_index().ok_or_else(not_compiled)?;
        let debugged = control.debugged.iter().find(|id| control.state.tree.find(id).is_some());
        if let Some(node) = debugged {
            let error = NodeError::simple(ErrorCode::NodeDebuggerEnabled);
            self.live.lock().exceptions.add_error(node, error);
            return Err(NetworkError::Node {
                node: node.clone(),
                error,
            });
        }
        let current = control.state.tree.content_hash();
        let compiled = library.hash(index).ok_or_else(not_compiled)?;
        if compiled != current {
            return Err(NetworkError::HashMismatch {
                network: self.id.clone(),
                compiled,
                current,
            });
        }

        let mut object = library.create_node(index, self.polyphonic).ok_or_else(not_compiled)?;
        if let Some(specs) = &control.specs {
            object.prepare(specs).map_err(|error| NetworkError::Node {
                node: self.id.clone(),
                error,
            })?;
        }
        for data_type in DataType::ALL {
            for slot in 0..library.num_data_objects(index, data_type) {
                let data = self.data.get_or_create(data_type, slot);
                if let Err(e) = object.set_external_data(&data, slot) {
                    tracing::warn!(network = %self.id, slot, error = %e, "compiled node refused data");
                }
            }
        }

        let mut live = self.live.lock();
        for (i, v) in live.values.iter().enumerate() {
            object.set_parameter(i, *v);
        }
        live.frozen = Some(object);
        tracing::info!(network = %self.id, hash = format_args!("{current:#018x}"), "froze network");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------------

    /// Replaces data slot `index` and rebinds every node that uses it.
    ///
    /// # Errors
    ///
    /// Returns the first binding a node refused, e.g. a display buffer that
    /// already has a writer. The refusal is also recorded in the exception
    /// handler.
    pub fn set_external_data(&self, data: ExternalData, index: usize) -> Result<(), NetworkError> {
        let Some(data_type) = data.data_type() else {
            return Ok(());
        };
        self.data.set_data(index, data.clone());

        let control = self.control.lock();
        let mut live = self.live.lock();
        let mut result = Ok(());
        for node in control.state.tree.nodes() {
            let positions = node
                .data
                .iter()
                .filter(|d| d.data_type == data_type)
                .enumerate()
                .filter(|(_, d)| d.index == index)
                .map(|(k, _)| k);
            for position in positions {
                let bound = match live.root.find_mut(&node.id) {
                    Some(target) => target.set_external_data(&data, position),
                    None => continue,
                };
                if let Err(error) = bound {
                    if result.is_ok() {
                        result = Err(NetworkError::Node {
                            node: node.id.clone(),
                            error,
                        });
                    }
                }
                live.record_binding(&node.id, bound);
            }
        }
        if let Some(frozen) = &mut live.frozen {
            if let Err(e) = frozen.set_external_data(&data, index) {
                tracing::warn!(network = %self.id, index, error = %e, "compiled node refused data");
            }
        }
        result
    }

    // ------------------------------------------------------------------------
    // Embedding
    // ------------------------------------------------------------------------

    /// Makes this network an embedded network of `parent`.
    pub fn set_parent_network(&self, parent: &Arc<DspNetwork>) {
        *self.parent.write() = Arc::downgrade(parent);
    }

    /// The network this one is embedded in.
    pub fn parent_network(&self) -> Option<Arc<DspNetwork>> {
        self.parent.read().upgrade()
    }

    /// Voice context; embedded networks use the one of their parent.
    pub fn voice_handler(&self) -> Arc<PolyHandler> {
        match self.parent_network() {
            Some(parent) => parent.voice_handler(),
            None => Arc::clone(&self.voices),
        }
    }
}

#[cfg(test)]
mod tests {
    use scriptnode_config::{DataSlot, NodeTree};
    use snex_core::AudioBuffer;

    use super::*;

    fn network(tree: NetworkTree) -> DspNetwork {
        DspNetwork::new(tree, NetworkContext::default()).unwrap()
    }

    fn adder() -> NetworkTree {
        NetworkTree::new("main")
            .with_parameter(
                ParameterTree::new("Offset", 0.0)
                    .with_range(ParameterRange::new(0.0, 10.0))
                    .with_connection("add", "Value"),
            )
            .with_root(NodeTree::new("container.chain", "main").with_child(NodeTree::new("math.add", "add")))
    }

    fn render(network: &DspNetwork, channels: usize, num_samples: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(channels, num_samples);
        network.process(&mut buffer.as_process_data());
        buffer
    }

    #[test]
    fn suffixes_ids() {
        let taken = ["gain", "gain1", "osc3"];
        let is_taken = |id: &str| taken.contains(&id);
        assert_eq!(non_existent_id("peak", is_taken), "peak");
        assert_eq!(non_existent_id("gain", is_taken), "gain2");
        assert_eq!(non_existent_id("gain1", is_taken), "gain2");
        assert_eq!(non_existent_id("osc3", is_taken), "osc4");
    }

    #[test]
    fn voices_follow_notes_only_when_polyphonic() {
        let mono = network(adder());
        mono.prepare_to_play(44100.0, 4);
        assert_eq!(mono.handle_hise_event(&mut HiseEvent::note_on(1, 60, 100)), None);
        assert!(mono.active_voices().is_empty());

        let poly = network(adder().with_polyphony(true));
        assert_eq!(poly.handle_hise_event(&mut HiseEvent::note_on(1, 60, 100)), None);
        poly.prepare_to_play(44100.0, 4);
        assert_eq!(poly.handle_hise_event(&mut HiseEvent::note_on(1, 60, 100)), Some(0));
        assert_eq!(poly.handle_hise_event(&mut HiseEvent::controller(1, 1, 64)), None);

        // structural edits keep sounding notes
        let id = poly.create("core.empty", None).unwrap();
        poly.add_node(&id, "main", 0).unwrap();
        assert_eq!(poly.active_voices(), [0]);

        let mut all_off = HiseEvent {
            kind: EventType::AllNotesOff,
            ..HiseEvent::default()
        };
        poly.handle_hise_event(&mut all_off);
        assert!(poly.active_voices().is_empty());
    }

    #[test]
    fn exhausted_suffix_starts_a_new_counter() {
        let max = format!("gain{}", u64::MAX);
        let taken = [max.clone(), format!("{max}_1")];
        let is_taken = |id: &str| taken.iter().any(|t| t == id);
        assert_eq!(non_existent_id(&max, is_taken), format!("{max}_2"));
    }

    #[test]
    fn process_before_prepare_passes_through() {
        let network = network(adder());
        network.set_network_parameter(0, 10.0);
        assert!(!network.is_initialised());

        let buffer = render(&network, 2, 4);
        assert!(buffer.channel(0).iter().all(|s| *s == 0.0));

        network.prepare_to_play(44100.0, 4);
        assert!(network.is_initialised());
        let buffer = render(&network, 2, 4);
        assert!(buffer.channel(0).iter().all(|s| *s == 1.0));
    }

    #[test]
    fn network_parameters_convert_ranges() {
        let network = network(adder());
        network.prepare_to_play(44100.0, 4);

        network.set_network_parameter(0, 5.0);
        assert_eq!(network.node_parameter("add", "Value"), Some(0.5));
        network.set_network_parameter(0, 20.0);
        assert_eq!(network.network_parameter("Offset"), Some(10.0));
        assert_eq!(network.node_parameter("add", "Value"), Some(1.0));

        assert!(matches!(
            network.set_network_parameter_by_id("Nope", 1.0),
            Err(NetworkError::UnknownNetworkParameter(_))
        ));
    }

    #[test]
    fn parameter_data_from_json_is_all_or_nothing() {
        let network = network(adder());
        network.set_parameter_data_from_json(r#"{"Offset": 2.5}"#).unwrap();
        assert_eq!(network.network_parameter("Offset"), Some(2.5));

        let err = network
            .set_parameter_data_from_json(r#"{"Offset": 4.0, "Missing": 1.0}"#)
            .unwrap_err();
        assert!(matches!(err, NetworkError::UnknownNetworkParameter(_)));
        assert_eq!(network.network_parameter("Offset"), Some(2.5));
        assert!(network.set_parameter_data_from_json("[1, 2]").is_err());
        assert_eq!(network.description().parameters[0].value, 2.5);
    }

    #[test]
    fn create_reuses_matching_ids() {
        let network = network(adder());
        assert_eq!(network.create("math.add", Some("add")).unwrap(), "add");
        assert_eq!(network.create("core.gain", Some("add")).unwrap(), "add1");
        assert_eq!(network.create("core.gain", None).unwrap(), "gain");
        assert_eq!(network.create("core.gain", Some("gain1")).unwrap(), "gain1");
        assert_eq!(network.unused_node_ids(), ["add1", "gain", "gain1"]);
        assert!(network.create("core.reverb", None).is_err());
    }

    #[test]
    fn add_and_remove_nodes() {
        let network = network(adder());
        network.prepare_to_play(44100.0, 4);
        network.set_network_parameter(0, 10.0);

        let id = network.create("math.mul", None).unwrap();
        network.set_node_parameter(&id, "Value", 3.0).unwrap_err();
        network.add_node(&id, "main", 1).unwrap();
        network.set_node_parameter(&id, "Value", 3.0).unwrap();
        assert_eq!(network.used_node_ids(), ["main", "add", "mul"]);
        assert!(render(&network, 1, 2).channel(0).iter().all(|s| *s == 3.0));

        network.remove_node("add").unwrap();
        assert_eq!(network.unused_node_ids(), ["add"]);
        assert!(network.description().parameters[0].connections.is_empty());
        assert!(network.delete_if_unused("add"));
        assert!(!network.delete_if_unused("mul"));

        assert!(matches!(network.remove_node("main"), Err(NetworkError::RootNode(_))));
        assert!(matches!(network.add_node("main", "mul", 0), Err(NetworkError::RootNode(_))));
        let gain = network.create("core.gain", None).unwrap();
        assert!(matches!(network.add_node(&gain, "mul", 0), Err(NetworkError::NotAContainer(_))));
    }

    #[test]
    fn moving_a_container_into_itself_fails() {
        let tree = NetworkTree::new("main").with_root(
            NodeTree::new("container.chain", "main")
                .with_child(NodeTree::new("container.split", "outer").with_child(NodeTree::new("container.chain", "inner"))),
        );
        let network = network(tree);
        assert!(network.add_node("outer", "inner", 0).is_err());
        assert_eq!(network.used_node_ids(), ["main", "outer", "inner"]);
    }

    #[test]
    fn clone_and_paste_subtree() {
        let tree = NetworkTree::new("main").with_root(
            NodeTree::new("container.chain", "main").with_child(
                NodeTree::new("container.chain", "chain")
                    .with_child(NodeTree::new("core.peak", "peak").with_modulation("mul", "Value"))
                    .with_child(NodeTree::new("math.mul", "mul")),
            ),
        );
        let network = network(tree);
        let copy = network.clone_with_new_ids("chain").unwrap();
        assert_eq!(copy, "chain1");

        let pasted = network.get("chain1").unwrap();
        assert_eq!(pasted.ids(), ["chain1", "peak1", "mul1"]);
        assert_eq!(pasted.nodes[0].modulation[0].node, "mul1");

        network.add_node("chain1", "main", 1).unwrap();
        assert_eq!(network.used_node_ids().len(), 7);
    }

    #[test]
    fn failed_edits_keep_the_previous_tree() {
        let network = network(adder());
        network.prepare_to_play(44100.0, 4);
        network.set_network_parameter(0, 10.0);

        let id = network
            .create_from_description(&NodeTree::new("core.peak", "peak").with_modulation("missing", "Value"))
            .unwrap();
        assert!(network.add_node(&id, "main", 0).is_err());
        assert_eq!(network.used_node_ids(), ["main", "add"]);
        assert!(render(&network, 1, 2).channel(0).iter().all(|s| *s == 1.0));
    }

    #[test]
    fn undo_and_redo_structural_edits() {
        let network = network(adder());
        network.set_undo_enabled(true);

        let id = network.create("core.gain", None).unwrap();
        network.add_node(&id, "main", 0).unwrap();
        assert_eq!(network.used_node_ids(), ["main", "gain", "add"]);

        assert!(network.undo().unwrap());
        assert_eq!(network.used_node_ids(), ["main", "add"]);
        assert_eq!(network.unused_node_ids(), ["gain"]);
        assert!(network.undo().unwrap());
        assert!(network.unused_node_ids().is_empty());
        assert!(!network.undo().unwrap());

        assert!(network.redo().unwrap());
        assert!(network.redo().unwrap());
        assert_eq!(network.used_node_ids(), ["main", "gain", "add"]);
        assert!(!network.can_redo());

        network.set_undo_enabled(false);
        assert!(!network.can_undo());
    }

    #[test]
    fn selection_follows_nodes() {
        let network = network(adder());
        network.set_undo_enabled(true);
        assert!(network.select("add"));
        assert!(network.select("add"));
        assert!(!network.select("ghost"));
        assert_eq!(network.selection(), ["add"]);

        let id = network.create("core.gain", None).unwrap();
        network.select(&id);
        network.undo().unwrap();
        assert_eq!(network.selection(), ["add"]);

        network.deselect("add");
        assert!(!network.is_selected("add"));
        network.select("add");
        network.deselect_all();
        assert!(network.selection().is_empty());
    }

    #[test]
    fn deprecated_nodes_are_recorded_but_run() {
        let tree = NetworkTree::new("main").with_root(
            NodeTree::new("container.chain", "main").with_child(
                NodeTree::new("math.op", "op").with_parameter(ParameterTree::new("Value", 0.5)),
            ),
        );
        let network = network(tree);
        network.prepare_to_play(44100.0, 2);

        let err = network.error("op").unwrap();
        assert_eq!(err.code, ErrorCode::DeprecatedNode);
        assert!(network.check_before_compilation().is_err());

        let mut buffer = AudioBuffer::from_channels(&[vec![1.0, 1.0]]);
        network.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[0.5, 0.5]);
    }

    #[test]
    fn embedded_tables_and_shared_display_buffers() {
        let tree = NetworkTree::new("main").with_root(
            NodeTree::new("container.chain", "main")
                .with_child(
                    NodeTree::new("core.table", "table")
                        .with_data(DataSlot::new(DataType::Table, 0).with_values(vec![0.25; 4])),
                )
                .with_child(NodeTree::new("core.peak", "a").with_data(DataSlot::new(DataType::DisplayBuffer, 0)))
                .with_child(NodeTree::new("core.peak", "b").with_data(DataSlot::new(DataType::DisplayBuffer, 0))),
        );
        let network = network(tree);
        network.prepare_to_play(44100.0, 2);

        assert!(network.error("a").is_none());
        assert_eq!(network.error("b").map(|e| e.code), Some(ErrorCode::RingBufferMultipleWriters));

        let mut buffer = AudioBuffer::from_channels(&[vec![1.0, -1.0]]);
        network.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[0.25, -0.25]);

        let table = ExternalData::create(DataType::Table);
        table.as_table().unwrap().set_values(vec![2.0; 4]);
        network.set_external_data(table, 0).unwrap();
        let mut buffer = AudioBuffer::from_channels(&[vec![0.5, 0.5]]);
        network.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[1.0, 1.0]);
    }

    #[test]
    fn rebuild_keeps_display_buffer_binding() {
        let tree = NetworkTree::new("main").with_root(
            NodeTree::new("container.chain", "main")
                .with_child(NodeTree::new("core.peak", "peak").with_data(DataSlot::new(DataType::DisplayBuffer, 0))),
        );
        let network = network(tree);
        network.prepare_to_play(44100.0, 2);

        let id = network.create("core.empty", None).unwrap();
        network.add_node(&id, "main", 0).unwrap();
        assert!(network.exceptions().is_ok());
        let buffer = network.data().get_or_create(DataType::DisplayBuffer, 0);
        assert!(buffer.as_display_buffer().unwrap().has_writer());
    }

    #[test]
    fn modulation_value_of_last_child() {
        let tree = NetworkTree::new("main")
            .with_root(NodeTree::new("container.chain", "main").with_child(NodeTree::new("core.peak", "peak")));
        let network = network(tree);
        network.prepare_to_play(44100.0, 2);
        assert_eq!(network.handle_modulation(), None);

        let mut buffer = AudioBuffer::from_channels(&[vec![0.5, -0.75]]);
        network.process(&mut buffer.as_process_data());
        assert_eq!(network.handle_modulation(), Some(0.75));
        assert_eq!(network.handle_modulation(), None);
    }

    #[test]
    fn embedded_networks_share_the_parent_voices() {
        let parent = Arc::new(network(NetworkTree::new("parent").with_polyphony(true)));
        let child = network(NetworkTree::new("child").with_polyphony(true));
        assert!(!Arc::ptr_eq(&child.voice_handler(), &parent.voice_handler()));

        child.set_parent_network(&parent);
        assert!(Arc::ptr_eq(&child.voice_handler(), &parent.voice_handler()));
        assert_eq!(child.parent_network().map(|p| p.id().to_string()), Some("parent".into()));

        child.prepare_to_play(44100.0, 16);
        assert!(child.specs().is_some_and(|s| s.is_polyphonic()));
    }
}
