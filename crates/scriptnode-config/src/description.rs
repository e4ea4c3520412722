//! Declarative network descriptions.
//!
//! A [`NetworkTree`] describes a whole network: its root node, the network
//! parameters and the connections from those parameters to node parameters.
//! Nodes are described by [`NodeTree`], which names the factory path the node
//! is created from, and carries properties, parameters, data slots and child
//! nodes.
//!
//! # TOML Format
//!
//! ```toml
//! id = "main"
//! polyphonic = false
//!
//! [[parameters]]
//! id = "Volume"
//! value = -6.0
//! range = { min = -100.0, max = 0.0 }
//! connections = [{ node = "gain", parameter = "Gain" }]
//!
//! [root]
//! id = "main"
//! path = "container.chain"
//!
//! [[root.nodes]]
//! id = "gain"
//! path = "core.gain"
//! parameters = [{ id = "Gain", value = -6.0, range = { min = -100.0, max = 0.0 } }]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use snex_core::types::fnv1a;
use snex_core::{DataType, ParameterRange};

use crate::error::ConfigError;

/// Factory path prefix of nodes that embed another network of the project.
pub const PROJECT_PREFIX: &str = "project.";

/// A property value.
///
/// Missing properties read as `false`, `0` or empty text unless a node
/// registers another default (see [`default_property`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A flag.
    Bool(bool),
    /// A number.
    Number(f64),
    /// Text, e.g. an enum name.
    Text(String),
}

impl PropertyValue {
    /// The flag, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The text, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            PropertyValue::Bool(b) => !b,
            PropertyValue::Number(_) => false,
            PropertyValue::Text(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Number(n) => write!(f, "{n}"),
            PropertyValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

/// Registered default of a named property.
pub fn default_property(name: &str) -> Option<PropertyValue> {
    match name {
        "Converter" => Some(PropertyValue::Text("Identity".into())),
        _ => None,
    }
}

/// A link from a parameter or modulation source to a node parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Target node id.
    pub node: String,
    /// Target parameter id.
    pub parameter: String,
}

impl Connection {
    /// A connection to `node.parameter`.
    pub fn new(node: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            parameter: parameter.into(),
        }
    }
}

/// A parameter with its value, range and outgoing connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterTree {
    /// Parameter id.
    pub id: String,
    /// Current value.
    #[serde(default)]
    pub value: f64,
    /// Value range.
    #[serde(default, skip_serializing_if = "ParameterRange::is_identity")]
    pub range: ParameterRange,
    /// Targets, for network parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
}

impl ParameterTree {
    /// A parameter in the 0..1 range.
    pub fn new(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value,
            range: ParameterRange::default(),
            connections: Vec::new(),
        }
    }

    /// Sets the range.
    pub fn with_range(mut self, range: ParameterRange) -> Self {
        self.range = range;
        self
    }

    /// Adds a connection.
    pub fn with_connection(mut self, node: impl Into<String>, parameter: impl Into<String>) -> Self {
        self.connections.push(Connection::new(node, parameter));
        self
    }
}

/// A data slot used by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSlot {
    /// Kind of data.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Slot index in the network's data holder.
    pub index: usize,
    /// Embedded content for tables and slider packs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f32>>,
}

impl DataSlot {
    /// Slot `index` of `data_type`.
    pub fn new(data_type: DataType, index: usize) -> Self {
        Self {
            data_type,
            index,
            values: None,
        }
    }

    /// Embeds content.
    pub fn with_values(mut self, values: Vec<f32>) -> Self {
        self.values = Some(values);
        self
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Description of one node and its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTree {
    /// Node id, unique within the network.
    pub id: String,
    /// Factory path, e.g. `core.gain` or `container.chain`.
    pub path: String,
    /// Whether the node is bypassed.
    #[serde(default, skip_serializing_if = "is_false")]
    pub bypassed: bool,
    /// Properties by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyValue>,
    /// Parameters in index order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterTree>,
    /// External data slots.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataSlot>,
    /// Targets of the node's modulation output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modulation: Vec<Connection>,
    /// Child nodes, in processing order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeTree>,
}

impl NodeTree {
    /// A node without properties or children.
    pub fn new(path: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            bypassed: false,
            properties: BTreeMap::new(),
            parameters: Vec::new(),
            data: Vec::new(),
            modulation: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Sets a property.
    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Adds a parameter.
    pub fn with_parameter(mut self, parameter: ParameterTree) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Adds a data slot.
    pub fn with_data(mut self, slot: DataSlot) -> Self {
        self.data.push(slot);
        self
    }

    /// Adds a modulation target.
    pub fn with_modulation(mut self, node: impl Into<String>, parameter: impl Into<String>) -> Self {
        self.modulation.push(Connection::new(node, parameter));
        self
    }

    /// Appends a child.
    pub fn with_child(mut self, child: NodeTree) -> Self {
        self.nodes.push(child);
        self
    }

    /// Sets the bypass flag.
    pub fn with_bypass(mut self, bypassed: bool) -> Self {
        self.bypassed = bypassed;
        self
    }

    /// Property by name, falling back to its registered default.
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.properties
            .get(name)
            .cloned()
            .or_else(|| default_property(name))
    }

    /// Parameter by id.
    pub fn parameter(&self, id: &str) -> Option<&ParameterTree> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Mutable parameter by id.
    pub fn parameter_mut(&mut self, id: &str) -> Option<&mut ParameterTree> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }

    /// Depth-first iterator over this node and all descendants.
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter { stack: vec![self] }
    }

    /// Node with `id` in this subtree.
    pub fn find(&self, id: &str) -> Option<&NodeTree> {
        self.iter().find(|n| n.id == id)
    }

    /// Mutable node with `id` in this subtree.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut NodeTree> {
        if self.id == id {
            return Some(self);
        }
        self.nodes.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Parent of the node with `id`.
    pub fn parent_of(&self, id: &str) -> Option<&NodeTree> {
        self.iter().find(|n| n.nodes.iter().any(|c| c.id == id))
    }

    /// Removes the descendant with `id`.
    pub fn remove(&mut self, id: &str) -> Option<NodeTree> {
        if let Some(pos) = self.nodes.iter().position(|c| c.id == id) {
            return Some(self.nodes.remove(pos));
        }
        self.nodes.iter_mut().find_map(|c| c.remove(id))
    }

    /// Inserts `node` as child `index` of `parent`. Returns `false` if the
    /// parent doesn't exist.
    pub fn insert(&mut self, parent: &str, index: usize, node: NodeTree) -> bool {
        match self.find_mut(parent) {
            Some(p) => {
                let index = index.min(p.nodes.len());
                p.nodes.insert(index, node);
                true
            }
            None => false,
        }
    }

    /// Ids of all nodes in this subtree, depth-first.
    pub fn ids(&self) -> Vec<&str> {
        self.iter().map(|n| n.id.as_str()).collect()
    }

    /// Renames every node of the subtree with `rename` and rewrites the
    /// connections that point at renamed nodes.
    ///
    /// Returns the old → new id map.
    pub fn rename_ids(&mut self, rename: &mut dyn FnMut(&str) -> String) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        self.collect_renames(rename, &mut map);
        self.apply_renames(&map);
        map
    }

    fn collect_renames(&mut self, rename: &mut dyn FnMut(&str) -> String, map: &mut BTreeMap<String, String>) {
        let new_id = rename(&self.id);
        map.insert(std::mem::replace(&mut self.id, new_id.clone()), new_id);
        for c in &mut self.nodes {
            c.collect_renames(rename, map);
        }
    }

    fn apply_renames(&mut self, map: &BTreeMap<String, String>) {
        let targets = self
            .modulation
            .iter_mut()
            .chain(self.parameters.iter_mut().flat_map(|p| p.connections.iter_mut()));
        for c in targets {
            if let Some(new_id) = map.get(&c.node) {
                c.node.clone_from(new_id);
            }
        }
        for c in &mut self.nodes {
            c.apply_renames(map);
        }
    }

    /// Removes properties holding their default value, recursively.
    pub fn normalize(&mut self) {
        self.properties.retain(|name, value| {
            !value.is_blank() && default_property(name).as_ref() != Some(value)
        });
        for c in &mut self.nodes {
            c.normalize();
        }
    }

    /// Id of the embedded network, for `project.<id>` nodes.
    pub fn project_include(&self) -> Option<&str> {
        self.path.strip_prefix(PROJECT_PREFIX)
    }
}

/// Depth-first, pre-order iterator over a [`NodeTree`].
#[derive(Debug)]
pub struct NodeIter<'a> {
    stack: Vec<&'a NodeTree>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a NodeTree;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.nodes.iter().rev());
        Some(node)
    }
}

/// File format of a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl Format {
    /// Format picked by the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Format::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Format::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Description of a whole network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkTree {
    /// Network id.
    pub id: String,
    /// Whether the network may be compiled into a project library.
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_compilation: bool,
    /// Whether the network renders voices. Fixed once the network exists.
    #[serde(default)]
    pub polyphonic: bool,
    /// Network parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterTree>,
    /// Root container.
    pub root: NodeTree,
}

impl NetworkTree {
    /// A monophonic network with an empty chain as root.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            root: NodeTree::new("container.chain", id.clone()),
            id,
            allow_compilation: false,
            polyphonic: false,
            parameters: Vec::new(),
        }
    }

    /// Replaces the root node.
    pub fn with_root(mut self, root: NodeTree) -> Self {
        self.root = root;
        self
    }

    /// Adds a network parameter.
    pub fn with_parameter(mut self, parameter: ParameterTree) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Sets the polyphony flag.
    pub fn with_polyphony(mut self, polyphonic: bool) -> Self {
        self.polyphonic = polyphonic;
        self
    }

    /// Sets the compilation flag.
    pub fn with_compilation(mut self, allow: bool) -> Self {
        self.allow_compilation = allow;
        self
    }

    /// Parses a description.
    pub fn parse(text: &str, format: Format) -> Result<Self, ConfigError> {
        Ok(match format {
            Format::Toml => toml::from_str(text)?,
            Format::Json => serde_json::from_str(text)?,
        })
    }

    /// Serializes the description.
    pub fn serialize(&self, format: Format) -> Result<String, ConfigError> {
        Ok(match format {
            Format::Toml => toml::to_string_pretty(self)?,
            Format::Json => serde_json::to_string_pretty(self)?,
        })
    }

    /// Load a description from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Format::Toml)
    }

    /// Convert the description to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.serialize(Format::Toml)
    }

    /// Load a description from a JSON string.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Format::Json)
    }

    /// Convert the description to a JSON string.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        self.serialize(Format::Json)
    }

    /// Load a description, picking the format by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::parse(&content, format)
    }

    /// Save the normalized description, picking the format by extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
            }
        }

        let content = self.normalized().serialize(format)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        tracing::debug!(network = %self.id, path = %path.display(), "saved network description");
        Ok(())
    }

    /// Copy with default-valued properties removed.
    pub fn normalized(&self) -> Self {
        let mut tree = self.clone();
        tree.root.normalize();
        tree
    }

    /// Hash of the network structure.
    ///
    /// FNV-1a over the canonical JSON of the normalized description with
    /// parameter values and bypass states cleared, so that the hash only
    /// changes when nodes, properties, ranges or connections change.
    pub fn content_hash(&self) -> u64 {
        let mut tree = self.normalized();
        for p in &mut tree.parameters {
            p.value = 0.0;
        }
        clear_runtime_state(&mut tree.root);
        // Serializing plain data to a JSON value can't fail.
        let canonical = serde_json::to_string(&tree).unwrap_or_default();
        fnv1a(canonical.as_bytes())
    }

    /// Depth-first iterator over all nodes.
    pub fn nodes(&self) -> NodeIter<'_> {
        self.root.iter()
    }

    /// Node by id.
    pub fn find(&self, id: &str) -> Option<&NodeTree> {
        self.root.find(id)
    }

    /// Mutable node by id.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut NodeTree> {
        self.root.find_mut(id)
    }

    /// Whether a node with `id` exists.
    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Network parameter by id.
    pub fn parameter(&self, id: &str) -> Option<&ParameterTree> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Ids of the project networks embedded in this one.
    pub fn project_includes(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for id in self.nodes().filter_map(NodeTree::project_include) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Number of slots of `data_type` used by any node (highest index + 1).
    pub fn num_data_objects(&self, data_type: DataType) -> usize {
        self.nodes()
            .flat_map(|n| &n.data)
            .filter(|d| d.data_type == data_type)
            .map(|d| d.index + 1)
            .max()
            .unwrap_or(0)
    }
}

fn clear_runtime_state(node: &mut NodeTree) {
    node.bypassed = false;
    for p in &mut node.parameters {
        p.value = 0.0;
    }
    for c in &mut node.nodes {
        clear_runtime_state(c);
    }
}
