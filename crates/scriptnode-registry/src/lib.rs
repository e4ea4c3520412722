//! Node registry and factory for scriptnode DSP networks.
//!
//! This crate maps factory paths (`core.gain`, `math.add`,
//! `container.split`...) to constructible nodes and builds whole
//! [`NodeBase`] trees from a [`NodeTree`] description.
//!
//! # Features
//!
//! - **Node Discovery**: list every path with its category and description
//! - **Factory Pattern**: create nodes by path at runtime
//! - **Poly Variants**: polyphonic networks get the per-voice variant of a
//!   node where one exists
//! - **Tree Building**: containers, properties, parameter values and bypass
//!   state from a description
//!
//! # Example
//!
//! ```rust
//! use scriptnode_registry::{NodeCategory, NodeRegistry};
//!
//! let registry = NodeRegistry::new();
//!
//! for node in registry.nodes_in_category(NodeCategory::Math) {
//!     println!("{}: {}", node.path, node.description);
//! }
//!
//! let gain = registry.create("core.gain", true).unwrap();
//! assert!(gain.is_polyphonic());
//! assert!(registry.create("core.missing", false).is_err());
//! ```

mod error;

pub use error::RegistryError;

use std::collections::BTreeMap;
use std::sync::Arc;

use scriptnode_config::{NodeTree, PropertyValue, default_property};
use scriptnode_nodes::{
    ContainerKind, EmptyNode, GainNode, MathNode, MathOp, Mono2StereoNode, NodeBase,
    OscillatorNode, PeakNode, SnexNode, TableNode, Waveform,
};
use snex_core::{NodeObject, SnexCompiler};

/// Property holding the operation of a legacy `math.op` node.
pub const OP_TYPE_PROPERTY: &str = "OpType";

/// Property holding the class id of a `core.snex_node`.
pub const CLASS_ID_PROPERTY: &str = "ClassId";

/// Property holding the code of a `core.snex_node`.
pub const CODE_PROPERTY: &str = "Code";

/// Property holding the channel count a `core.snex_node` is first compiled
/// for. The node recompiles when it is prepared for another count.
pub const NUM_CHANNELS_PROPERTY: &str = "NumChannels";

/// Property holding the initial waveform of a `core.oscillator`.
pub const MODE_PROPERTY: &str = "Mode";

/// Path of the SNEX node.
pub const SNEX_NODE_PATH: &str = "core.snex_node";

/// Category of a node for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    /// Gain, table, peak, oscillator and utilities.
    Core,
    /// Sample-wise arithmetic.
    Math,
    /// Nodes that run compiled SNEX classes.
    Snex,
    /// Networks from a compiled project library.
    Project,
}

impl NodeCategory {
    /// Returns a human-readable name for the category.
    pub const fn name(&self) -> &'static str {
        match self {
            NodeCategory::Core => "Core",
            NodeCategory::Math => "Math",
            NodeCategory::Snex => "SNEX",
            NodeCategory::Project => "Project",
        }
    }

    /// Returns a description of the category.
    pub const fn description(&self) -> &'static str {
        match self {
            NodeCategory::Core => "Gain stages, waveshapers, meters, oscillators and utilities",
            NodeCategory::Math => "Sample-wise arithmetic on the signal",
            NodeCategory::Snex => "Nodes running compiled SNEX classes",
            NodeCategory::Project => "Networks compiled into the project library",
        }
    }
}

/// Describes a node in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Factory path, `<factory>.<name>`.
    pub path: String,
    /// Brief description of the node.
    pub description: String,
    /// Category for organization.
    pub category: NodeCategory,
    /// Whether a per-voice variant exists.
    pub poly_variant: bool,
}

impl NodeDescriptor {
    /// A descriptor for a monophonic-only node.
    pub fn new(path: impl Into<String>, description: impl Into<String>, category: NodeCategory) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            category,
            poly_variant: false,
        }
    }

    /// Marks the node as having a per-voice variant.
    pub fn with_poly_variant(mut self) -> Self {
        self.poly_variant = true;
        self
    }
}

/// What a factory gets to build one node.
#[derive(Debug, Clone, Copy)]
pub struct FactoryArgs<'a> {
    /// Id of the node being created.
    pub id: &'a str,
    /// Whether the per-voice variant is wanted.
    pub polyphonic: bool,
    /// Properties of the description.
    pub properties: &'a BTreeMap<String, PropertyValue>,
}

impl FactoryArgs<'_> {
    /// Property `name`, falling back to its registered default.
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.properties
            .get(name)
            .cloned()
            .or_else(|| default_property(name))
    }

    /// Text property `name`.
    pub fn text(&self, name: &str) -> Option<String> {
        self.property(name).and_then(|p| p.as_str().map(str::to_string))
    }

    fn invalid(&self, property: &str, value: impl ToString) -> RegistryError {
        RegistryError::InvalidProperty {
            node: self.id.to_string(),
            property: property.to_string(),
            value: value.to_string(),
        }
    }
}

/// Factory function type for creating nodes.
pub type NodeFactory =
    Arc<dyn Fn(&FactoryArgs<'_>) -> Result<Box<dyn NodeObject>, RegistryError> + Send + Sync>;

/// Internal entry in the registry.
#[derive(Clone)]
struct RegistryEntry {
    descriptor: NodeDescriptor,
    factory: NodeFactory,
}

/// Registry of every node a network can create.
///
/// All built-in nodes are registered on construction. A SNEX compiler and
/// project networks are added explicitly.
#[derive(Clone)]
pub struct NodeRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.descriptor.path))
            .finish()
    }
}

impl NodeRegistry {
    /// Create a new registry with all built-in nodes registered.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(16),
        };
        registry.register_builtin_nodes();
        registry
    }

    /// Creates a registry whose `core.snex_node` compiles with `compiler`.
    pub fn with_compiler(mut self, compiler: Arc<dyn SnexCompiler>) -> Self {
        self.set_compiler(compiler);
        self
    }

    /// Replaces the compiler of `core.snex_node`.
    pub fn set_compiler(&mut self, compiler: Arc<dyn SnexCompiler>) {
        self.register(
            NodeDescriptor::new(SNEX_NODE_PATH, "Runs a compiled SNEX class", NodeCategory::Snex),
            move |args| {
                let class_id = args.text(CLASS_ID_PROPERTY).unwrap_or_else(|| args.id.to_string());
                let code = args.text(CODE_PROPERTY).unwrap_or_default();
                let num_channels = args
                    .property(NUM_CHANNELS_PROPERTY)
                    .and_then(|p| p.as_f64())
                    .map_or(2, |n| n.max(1.0) as usize);
                Ok(Box::new(SnexNode::new(Arc::clone(&compiler), code, class_id, num_channels)))
            },
        );
    }

    /// Register all built-in nodes.
    fn register_builtin_nodes(&mut self) {
        // Core
        self.register(
            NodeDescriptor::new("core.gain", "Smoothed gain in decibels", NodeCategory::Core)
                .with_poly_variant(),
            |args| Ok(Box::new(GainNode::new(args.polyphonic))),
        );
        self.register(
            NodeDescriptor::new(
                "core.table",
                "Scales the signal by a lookup table",
                NodeCategory::Core,
            ),
            |_| Ok(Box::new(TableNode::new())),
        );
        self.register(
            NodeDescriptor::new(
                "core.peak",
                "Sends the block peak as modulation value",
                NodeCategory::Core,
            ),
            |_| Ok(Box::new(PeakNode::new())),
        );
        self.register(
            NodeDescriptor::new(
                "core.oscillator",
                "Sine, saw and square oscillator",
                NodeCategory::Core,
            )
            .with_poly_variant(),
            |args| {
                let waveform = match args.property(MODE_PROPERTY) {
                    Some(PropertyValue::Text(name)) => {
                        Waveform::from_name(&name).ok_or_else(|| args.invalid(MODE_PROPERTY, name))?
                    }
                    Some(PropertyValue::Number(index)) => Waveform::from_index(index),
                    _ => Waveform::default(),
                };
                Ok(Box::new(OscillatorNode::new(args.polyphonic, waveform)))
            },
        );
        self.register(
            NodeDescriptor::new("core.empty", "Does nothing", NodeCategory::Core),
            |_| Ok(Box::new(EmptyNode)),
        );
        self.register(
            NodeDescriptor::new(
                "core.mono2stereo",
                "Copies the left channel to the right",
                NodeCategory::Core,
            ),
            |_| Ok(Box::new(Mono2StereoNode)),
        );

        // SNEX, until a compiler is set
        self.register(
            NodeDescriptor::new(SNEX_NODE_PATH, "Runs a compiled SNEX class", NodeCategory::Snex),
            |args| Err(RegistryError::NoCompiler(args.id.to_string())),
        );

        // Math
        for op in MathOp::ALL {
            self.register(
                NodeDescriptor::new(
                    format!("math.{op}"),
                    format!("Applies {op} to every sample"),
                    NodeCategory::Math,
                )
                .with_poly_variant(),
                move |args| Ok(Box::new(MathNode::new(op, args.polyphonic))),
            );
        }
        self.register(
            NodeDescriptor::new(
                "math.op",
                "Applies the operation named by OpType",
                NodeCategory::Math,
            )
            .with_poly_variant(),
            |args| {
                let op = match args.property(OP_TYPE_PROPERTY) {
                    Some(value) => {
                        let name = value.to_string();
                        MathOp::from_name(&name).ok_or_else(|| args.invalid(OP_TYPE_PROPERTY, name))?
                    }
                    None => MathOp::Mul,
                };
                Ok(Box::new(MathNode::new(op, args.polyphonic)))
            },
        );
    }

    /// Registers a node, replacing an entry with the same path.
    pub fn register<F>(&mut self, descriptor: NodeDescriptor, factory: F)
    where
        F: Fn(&FactoryArgs<'_>) -> Result<Box<dyn NodeObject>, RegistryError> + Send + Sync + 'static,
    {
        let entry = RegistryEntry {
            descriptor,
            factory: Arc::new(factory),
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.descriptor.path == entry.descriptor.path)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Removes the node registered under `path`.
    pub fn unregister(&mut self, path: &str) -> bool {
        let len = self.entries.len();
        self.entries.retain(|e| e.descriptor.path != path);
        self.entries.len() != len
    }

    /// Returns descriptors for all registered nodes.
    pub fn all_nodes(&self) -> Vec<&NodeDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    /// Returns descriptors for nodes in a specific category.
    pub fn nodes_in_category(&self, category: NodeCategory) -> Vec<&NodeDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.category == category)
            .map(|e| &e.descriptor)
            .collect()
    }

    /// Get a descriptor by path.
    pub fn get(&self, path: &str) -> Option<&NodeDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.path == path)
            .map(|e| &e.descriptor)
    }

    /// Every creatable path, containers included, sorted.
    pub fn all_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.iter().map(|e| e.descriptor.path.clone()).collect();
        paths.extend(ContainerKind::all_paths());
        paths.sort();
        paths
    }

    /// Whether `path` names a registered node or a container.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some() || ContainerKind::from_path(path).is_some()
    }

    /// Create a node by path without properties.
    ///
    /// With `polyphonic` set, the per-voice variant is created if the node
    /// has one.
    pub fn create(&self, path: &str, polyphonic: bool) -> Result<Box<dyn NodeObject>, RegistryError> {
        let properties = BTreeMap::new();
        self.create_with(
            path,
            &FactoryArgs {
                id: path,
                polyphonic,
                properties: &properties,
            },
        )
    }

    /// Create a node by path with explicit factory arguments.
    pub fn create_with(&self, path: &str, args: &FactoryArgs<'_>) -> Result<Box<dyn NodeObject>, RegistryError> {
        if ContainerKind::from_path(path).is_some() {
            return Err(RegistryError::NotALeaf(path.to_string()));
        }
        let entry = self
            .entries
            .iter()
            .find(|e| e.descriptor.path == path)
            .ok_or_else(|| RegistryError::UnknownPath(path.to_string()))?;

        let args = FactoryArgs {
            polyphonic: args.polyphonic && entry.descriptor.poly_variant,
            ..*args
        };
        (entry.factory)(&args)
    }

    /// Builds the node tree of a description.
    ///
    /// Parameter values and the bypass state are applied; values of unknown
    /// parameters are skipped with a warning.
    pub fn build(&self, tree: &NodeTree, polyphonic: bool) -> Result<NodeBase, RegistryError> {
        let mut node = match ContainerKind::from_path(&tree.path) {
            Some(kind) => {
                let children = tree
                    .nodes
                    .iter()
                    .map(|c| self.build(c, polyphonic))
                    .collect::<Result<Vec<_>, _>>()?;
                NodeBase::container(tree.id.as_str(), kind, children)
            }
            None => {
                if !tree.nodes.is_empty() {
                    return Err(RegistryError::UnexpectedChildren {
                        node: tree.id.clone(),
                        path: tree.path.clone(),
                    });
                }
                let object = self.create_with(
                    &tree.path,
                    &FactoryArgs {
                        id: &tree.id,
                        polyphonic,
                        properties: &tree.properties,
                    },
                )?;
                NodeBase::leaf(tree.id.as_str(), tree.path.as_str(), object)
            }
        };

        node.set_bypassed(tree.bypassed);
        for p in &tree.parameters {
            if !node.set_parameter_by_name(&p.id, p.value) {
                tracing::warn!(node = %tree.id, parameter = %p.id, "skipping unknown parameter");
            }
        }
        Ok(node)
    }

    /// Returns the number of registered nodes (containers excluded).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no nodes are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use scriptnode_config::ParameterTree;
    use snex_core::{AudioBuffer, ExceptionHandler, PrepareSpecs};
    use scriptnode_nodes::PrepareContext;

    use super::*;

    #[test]
    fn registry_creation() {
        let registry = NodeRegistry::new();
        assert_eq!(registry.len(), 13);
        assert_eq!(registry.nodes_in_category(NodeCategory::Math).len(), 6);
        assert_eq!(registry.nodes_in_category(NodeCategory::Core).len(), 6);
        assert!(registry.nodes_in_category(NodeCategory::Project).is_empty());
    }

    #[test]
    fn create_every_node() {
        let registry = NodeRegistry::new();
        for node in registry.all_nodes() {
            if node.path == SNEX_NODE_PATH {
                continue;
            }
            let created = registry.create(&node.path, false);
            assert!(created.is_ok(), "{} failed", node.path);
        }
    }

    #[test]
    fn poly_variant_only_where_available() {
        let registry = NodeRegistry::new();
        assert!(registry.create("core.gain", true).unwrap().is_polyphonic());
        assert!(!registry.create("core.gain", false).unwrap().is_polyphonic());
        assert!(!registry.create("core.peak", true).unwrap().is_polyphonic());
    }

    #[test]
    fn unknown_and_container_paths() {
        let registry = NodeRegistry::new();
        assert_eq!(
            registry.create("core.reverb", false).err().unwrap(),
            RegistryError::UnknownPath("core.reverb".into())
        );
        assert_eq!(
            registry.create("container.chain", false).err().unwrap(),
            RegistryError::NotALeaf("container.chain".into())
        );
        assert!(registry.contains("container.oversample2x"));
        assert!(registry.all_paths().contains(&"container.fix64_block".to_string()));
    }

    #[test]
    fn snex_node_needs_compiler() {
        let registry = NodeRegistry::new();
        let err = registry.create(SNEX_NODE_PATH, false).err().unwrap();
        assert!(matches!(err, RegistryError::NoCompiler(_)));
    }

    #[test]
    fn legacy_math_op_reads_op_type() {
        let registry = NodeRegistry::new();
        let tree = NodeTree::new("container.chain", "root")
            .with_child(
                NodeTree::new("math.op", "op")
                    .with_property(OP_TYPE_PROPERTY, "add")
                    .with_parameter(ParameterTree::new("Value", 0.25)),
            )
            .with_child(NodeTree::new("math.op", "default"));
        let mut root = registry.build(&tree, false).unwrap();

        let mut handler = ExceptionHandler::new();
        root.prepare(&PrepareSpecs::new(44100.0, 2, 1), &mut PrepareContext::new(&mut handler));
        let mut buffer = AudioBuffer::from_channels(&[vec![0.5, 1.0]]);
        root.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[0.75, 1.25]);

        let bad = NodeTree::new("math.op", "bad").with_property(OP_TYPE_PROPERTY, "pow");
        assert!(matches!(
            registry.build(&bad, false),
            Err(RegistryError::InvalidProperty { .. })
        ));
    }

    #[test]
    fn build_applies_bypass_and_values() {
        let registry = NodeRegistry::new();
        let tree = NodeTree::new("container.split", "root")
            .with_child(
                NodeTree::new("core.gain", "gain")
                    .with_parameter(ParameterTree::new("Gain", -12.0))
                    .with_parameter(ParameterTree::new("Missing", 1.0)),
            )
            .with_child(NodeTree::new("math.clear", "clear").with_bypass(true));
        let root = registry.build(&tree, true).unwrap();

        assert_eq!(root.children().len(), 2);
        assert_eq!(root.find("gain").and_then(|n| n.parameter_value(0)), Some(-12.0));
        assert!(root.find("clear").is_some_and(NodeBase::is_bypassed));
        assert!(root.find("gain").is_some_and(NodeBase::is_polyphonic));
    }

    #[test]
    fn leaf_with_children_is_rejected() {
        let registry = NodeRegistry::new();
        let tree = NodeTree::new("core.gain", "gain").with_child(NodeTree::new("core.empty", "e"));
        assert!(matches!(
            registry.build(&tree, false),
            Err(RegistryError::UnexpectedChildren { .. })
        ));
    }

    #[test]
    fn custom_registration_replaces_path() {
        let mut registry = NodeRegistry::new();
        let len = registry.len();
        registry.register(
            NodeDescriptor::new("core.empty", "Replaced", NodeCategory::Core),
            |_| Ok(Box::new(EmptyNode)),
        );
        assert_eq!(registry.len(), len);
        assert_eq!(registry.get("core.empty").map(|d| d.description.as_str()), Some("Replaced"));
        assert!(registry.unregister("core.empty"));
        assert!(!registry.contains("core.empty"));
    }
}
