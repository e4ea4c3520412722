//! Boundary to a compiled project library.
//!
//! A project library holds compiled versions of project networks. A network
//! whose id is in the library can be frozen: the compiled node replaces the
//! interpreted tree for audio and parameter forwarding, as long as the
//! library hash matches the hash of the current description.
//!
//! [`StaticProjectLibrary`] registers native implementations in process.
//! [`StaticProjectLibrary::register_network`] compiles a description into an
//! [`OpaqueNetworkHolder`] running its own copy of the network.

use std::fmt;
use std::sync::Arc;

use scriptnode_config::NetworkTree;
use snex_core::{DataType, NodeObject};

use crate::network::{DspNetwork, NetworkContext};
use crate::opaque::{HostHelpers, OpaqueNetworkHolder};

/// How a library node wraps its implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperType {
    /// A plain node object.
    Node,
    /// A whole network behind an opaque node.
    OpaqueNetwork,
}

/// A library of compiled nodes, indexed `0..num_nodes()`.
pub trait ProjectLibrary: Send + Sync {
    /// Number of nodes.
    fn num_nodes(&self) -> usize;

    /// Id of node `index`, matching the id of the network it was compiled
    /// from.
    fn node_id(&self, index: usize) -> Option<&str>;

    /// Number of data slots of `data_type` the node uses.
    fn num_data_objects(&self, index: usize, data_type: DataType) -> usize;

    /// Creates an instance of node `index`.
    fn create_node(&self, index: usize, polyphonic: bool) -> Option<Box<dyn NodeObject>>;

    /// Content hash of the description the node was compiled from.
    fn hash(&self, index: usize) -> Option<u64>;

    /// Wrapper of node `index`.
    fn wrapper_type(&self, index: usize) -> Option<WrapperType>;

    /// Index of the node with `id`.
    fn index_of(&self, id: &str) -> Option<usize> {
        (0..self.num_nodes()).find(|i| self.node_id(*i) == Some(id))
    }
}

/// Creates a node instance; the flag requests the polyphonic variant.
pub type NodeInitializer = Arc<dyn Fn(bool) -> Option<Box<dyn NodeObject>> + Send + Sync>;

#[derive(Clone)]
struct LibraryEntry {
    id: String,
    hash: u64,
    wrapper: WrapperType,
    data: [usize; 4],
    init: NodeInitializer,
}

/// A [`ProjectLibrary`] of native implementations registered at runtime.
#[derive(Clone, Default)]
pub struct StaticProjectLibrary {
    entries: Vec<LibraryEntry>,
}

impl fmt::Debug for StaticProjectLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (&e.id, format!("{:#018x}", e.hash))))
            .finish()
    }
}

impl StaticProjectLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node object compiled from a description with `hash`.
    ///
    /// Replaces an entry with the same id.
    pub fn register<F>(&mut self, id: impl Into<String>, hash: u64, init: F)
    where
        F: Fn(bool) -> Option<Box<dyn NodeObject>> + Send + Sync + 'static,
    {
        self.insert(LibraryEntry {
            id: id.into(),
            hash,
            wrapper: WrapperType::Node,
            data: [0; 4],
            init: Arc::new(init),
        });
    }

    /// Compiles `tree` into an opaque node running its own network.
    ///
    /// The entry hash is the content hash of `tree`.
    pub fn register_network(&mut self, tree: &NetworkTree, context: NetworkContext) {
        let data = DataType::ALL.map(|t| HostHelpers::num_max_data_objects(tree, t));
        let description = tree.clone();
        let init = move |_polyphonic: bool| -> Option<Box<dyn NodeObject>> {
            let network = match DspNetwork::new(description.clone(), context.clone()) {
                Ok(n) => Arc::new(n),
                Err(e) => {
                    tracing::warn!(network = %description.id, error = %e, "compiled network failed to build");
                    return None;
                }
            };
            match OpaqueNetworkHolder::with_network(network) {
                Ok(holder) => Some(Box::new(holder)),
                Err(e) => {
                    tracing::warn!(network = %description.id, error = %e, "compiled network can't be embedded");
                    None
                }
            }
        };

        self.insert(LibraryEntry {
            id: tree.id.clone(),
            hash: tree.content_hash(),
            wrapper: WrapperType::OpaqueNetwork,
            data,
            init: Arc::new(init),
        });
    }

    fn insert(&mut self, entry: LibraryEntry) {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Ids of all entries in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }
}

impl ProjectLibrary for StaticProjectLibrary {
    fn num_nodes(&self) -> usize {
        self.entries.len()
    }

    fn node_id(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.id.as_str())
    }

    fn num_data_objects(&self, index: usize, data_type: DataType) -> usize {
        self.entries.get(index).map_or(0, |e| e.data[data_type.index()])
    }

    fn create_node(&self, index: usize, polyphonic: bool) -> Option<Box<dyn NodeObject>> {
        self.entries.get(index).and_then(|e| (e.init)(polyphonic))
    }

    fn hash(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|e| e.hash)
    }

    fn wrapper_type(&self, index: usize) -> Option<WrapperType> {
        self.entries.get(index).map(|e| e.wrapper)
    }
}

#[cfg(test)]
mod tests {
    use scriptnode_config::{DataSlot, NodeTree};
    use scriptnode_nodes::{MathNode, MathOp};

    use super::*;

    #[test]
    fn lookup_by_id() {
        let mut library = StaticProjectLibrary::new();
        library.register("a", 1, |p| Some(Box::new(MathNode::new(MathOp::Add, p)) as Box<dyn NodeObject>));
        library.register("b", 2, |_| None);
        library.register("a", 3, |_| None);

        assert_eq!(library.num_nodes(), 2);
        assert_eq!(library.index_of("b"), Some(1));
        assert_eq!(library.hash(0), Some(3));
        assert_eq!(library.wrapper_type(1), Some(WrapperType::Node));
        assert!(library.create_node(0, false).is_none());
        assert!(library.index_of("c").is_none());
    }

    #[test]
    fn compiled_network_reports_data_and_hash() {
        let tree = NetworkTree::new("fx").with_root(
            NodeTree::new("container.chain", "fx").with_child(
                NodeTree::new("core.table", "shape").with_data(DataSlot::new(DataType::Table, 2)),
            ),
        );
        let mut library = StaticProjectLibrary::new();
        library.register_network(&tree, NetworkContext::default());

        assert_eq!(library.hash(0), Some(tree.content_hash()));
        assert_eq!(library.wrapper_type(0), Some(WrapperType::OpaqueNetwork));
        assert_eq!(library.num_data_objects(0, DataType::Table), 3);
        assert_eq!(library.num_data_objects(0, DataType::SliderPack), 0);
        assert!(library.create_node(0, false).is_some());
    }
}
