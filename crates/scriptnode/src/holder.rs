//! Networks of one host context.
//!
//! A [`Holder`] owns every network a host created, keyed by id, and the one
//! network that renders audio. Audio callbacks take the read lock; the
//! control thread takes the write lock only to insert, replace or remove a
//! network, which is always built before and dropped after.
//!
//! Project networks registered with [`Holder::register_project_network`]
//! become `project.<id>` nodes that any later network can embed.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use scriptnode_config::{NetworkTree, PROJECT_PREFIX, sort_includes};
use scriptnode_registry::{NodeCategory, NodeDescriptor, NodeRegistry, RegistryError};
use snex_core::{HiseEvent, NodeObject, PrepareSpecs, ProcessData};

use crate::error::NetworkError;
use crate::network::{DspNetwork, NetworkContext};
use crate::opaque::OpaqueNetworkHolder;

#[derive(Debug, Default)]
struct Networks {
    list: Vec<Arc<DspNetwork>>,
    active: Option<Arc<DspNetwork>>,
}

/// Registry of the networks of one host.
#[derive(Debug)]
pub struct Holder {
    context: ArcSwap<NetworkContext>,
    networks: RwLock<Networks>,
}

impl Default for Holder {
    fn default() -> Self {
        Self::new(NetworkContext::default())
    }
}

impl Holder {
    /// An empty holder building networks with `context`.
    pub fn new(context: NetworkContext) -> Self {
        Self {
            context: ArcSwap::from_pointee(context),
            networks: RwLock::new(Networks::default()),
        }
    }

    /// Context new networks are built with.
    pub fn context(&self) -> Arc<NetworkContext> {
        self.context.load_full()
    }

    /// Builds a network and adds it, replacing a network with the same id.
    ///
    /// The first network becomes the active one. Replacing the active network
    /// activates the replacement.
    pub fn create_network(&self, tree: NetworkTree) -> Result<Arc<DspNetwork>, NetworkError> {
        let context = self.context();
        let network = Arc::new(DspNetwork::new(tree, NetworkContext::clone(&context))?);

        let replaced = {
            let mut networks = self.networks.write();
            let replaced = match networks.list.iter().position(|n| n.id() == network.id()) {
                Some(pos) => Some(std::mem::replace(&mut networks.list[pos], Arc::clone(&network))),
                None => {
                    networks.list.push(Arc::clone(&network));
                    None
                }
            };
            let activate = match &networks.active {
                Some(active) => active.id() == network.id(),
                None => true,
            };
            if activate {
                networks.active = Some(Arc::clone(&network));
            }
            replaced
        };
        drop(replaced);

        tracing::info!(network = %network.id(), "created network");
        Ok(network)
    }

    /// Network with `id`.
    pub fn get_network(&self, id: &str) -> Option<Arc<DspNetwork>> {
        self.networks.read().list.iter().find(|n| n.id() == id).cloned()
    }

    /// Ids of all networks in creation order.
    pub fn network_ids(&self) -> Vec<String> {
        self.networks.read().list.iter().map(|n| n.id().to_string()).collect()
    }

    /// Makes network `id` render audio.
    pub fn set_active_network(&self, id: &str) -> Result<(), NetworkError> {
        let network = self
            .get_network(id)
            .ok_or_else(|| NetworkError::UnknownNetwork(id.to_string()))?;
        self.networks.write().active = Some(network);
        tracing::debug!(network = %id, "activated network");
        Ok(())
    }

    /// The network that renders audio.
    pub fn active_network(&self) -> Option<Arc<DspNetwork>> {
        self.networks.read().active.clone()
    }

    /// Removes network `id`. Returns `false` if there is none.
    pub fn remove_network(&self, id: &str) -> bool {
        let removed = {
            let mut networks = self.networks.write();
            let Some(pos) = networks.list.iter().position(|n| n.id() == id) else {
                return false;
            };
            if networks.active.as_ref().is_some_and(|a| a.id() == id) {
                networks.active = None;
            }
            networks.list.remove(pos)
        };
        drop(removed);
        true
    }

    /// Removes every network.
    pub fn clear_all_networks(&self) {
        let previous = std::mem::take(&mut *self.networks.write());
        tracing::debug!(networks = previous.list.len(), "cleared networks");
        drop(previous);
    }

    /// Prepares every network.
    pub fn prepare(&self, specs: &PrepareSpecs) {
        let list = self.networks.read().list.clone();
        for network in list {
            network.prepare(specs);
        }
    }

    /// Prepares every network with its last channel count.
    pub fn prepare_to_play(&self, sample_rate: f64, block_size: usize) {
        let list = self.networks.read().list.clone();
        for network in list {
            network.prepare_to_play(sample_rate, block_size);
        }
    }

    /// Renders the active network. Without one, audio passes through.
    pub fn process(&self, data: &mut ProcessData<'_>) {
        if let Some(active) = &self.networks.read().active {
            active.process(data);
        }
    }

    /// Renders one frame of the active network.
    pub fn process_frame(&self, frame: &mut [f32]) {
        if let Some(active) = &self.networks.read().active {
            active.process_frame(frame);
        }
    }

    /// Renders one voice of the active network.
    pub fn process_voice(&self, voice: usize, data: &mut ProcessData<'_>) {
        if let Some(active) = &self.networks.read().active {
            active.process_voice(voice, data);
        }
    }

    /// Forwards an event to the active network. Returns the voice the
    /// event started or ended.
    pub fn handle_hise_event(&self, event: &mut HiseEvent) -> Option<usize> {
        self.networks
            .read()
            .active
            .as_ref()
            .and_then(|active| active.handle_hise_event(event))
    }

    /// Resets the active network.
    pub fn reset(&self) {
        if let Some(active) = &self.networks.read().active {
            active.reset();
        }
    }

    /// Makes `tree` available as node `project.<id>`.
    ///
    /// Each node instance runs its own copy of the network. Networks
    /// registered later can embed this one; the reverse is not possible.
    pub fn register_project_network(&self, tree: &NetworkTree) {
        let path = format!("{PROJECT_PREFIX}{}", tree.id);
        let current = self.context();
        let snapshot = NetworkContext::clone(&current);
        let description = tree.clone();
        let factory_path = path.clone();

        let mut registry = NodeRegistry::clone(&current.registry);
        registry.register(
            NodeDescriptor::new(path.as_str(), format!("Project network {}", tree.id), NodeCategory::Project),
            move |_args| {
                let creation = |reason: String| RegistryError::Creation {
                    path: factory_path.clone(),
                    reason,
                };
                let network = DspNetwork::new(description.clone(), snapshot.clone()).map_err(|e| creation(e.to_string()))?;
                let holder = OpaqueNetworkHolder::with_network(Arc::new(network)).map_err(|e| creation(e.to_string()))?;
                Ok(Box::new(holder) as Box<dyn NodeObject>)
            },
        );

        let mut next = NetworkContext::clone(&current);
        next.registry = Arc::new(registry);
        self.context.store(Arc::new(next));
        tracing::debug!(path = %path, "registered project network");
    }

    /// Registers the compilable networks of a project in include order.
    ///
    /// Returns the ids in registration order.
    ///
    /// # Errors
    ///
    /// Fails on includes of networks that are not compilable and on cyclic
    /// includes; nothing is registered then.
    pub fn load_project(&self, networks: &[NetworkTree]) -> Result<Vec<String>, NetworkError> {
        let sorted = sort_includes(networks)?;
        for tree in &sorted {
            self.register_project_network(tree);
        }
        Ok(sorted.iter().map(|t| t.id.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use scriptnode_config::{NodeTree, ParameterTree};
    use snex_core::AudioBuffer;

    use super::*;

    fn offset(id: &str, value: f64) -> NetworkTree {
        NetworkTree::new(id)
            .with_parameter(ParameterTree::new("Offset", value).with_connection("add", "Value"))
            .with_root(NodeTree::new("container.chain", id).with_child(NodeTree::new("math.add", "add")))
    }

    fn render(holder: &Holder) -> f32 {
        let mut buffer = AudioBuffer::new(1, 2);
        holder.process(&mut buffer.as_process_data());
        buffer.channel(0)[0]
    }

    #[test]
    fn first_network_is_active() {
        let holder = Holder::default();
        holder.create_network(offset("a", 0.25)).unwrap();
        holder.create_network(offset("b", 0.5)).unwrap();
        holder.prepare_to_play(44100.0, 2);

        assert_eq!(holder.network_ids(), ["a", "b"]);
        assert_eq!(render(&holder), 0.25);
        holder.set_active_network("b").unwrap();
        assert_eq!(render(&holder), 0.5);
        assert!(matches!(holder.set_active_network("c"), Err(NetworkError::UnknownNetwork(_))));
    }

    #[test]
    fn replacing_the_active_network() {
        let holder = Holder::default();
        holder.create_network(offset("a", 0.25)).unwrap();
        let replacement = holder.create_network(offset("a", 0.75)).unwrap();
        replacement.prepare_to_play(44100.0, 2);

        assert_eq!(holder.network_ids(), ["a"]);
        assert!(holder.active_network().is_some_and(|n| Arc::ptr_eq(&n, &replacement)));
        assert_eq!(render(&holder), 0.75);
    }

    #[test]
    fn remove_and_clear() {
        let holder = Holder::default();
        holder.create_network(offset("a", 0.25)).unwrap();
        holder.create_network(offset("b", 0.5)).unwrap();

        assert!(holder.remove_network("a"));
        assert!(!holder.remove_network("a"));
        assert!(holder.active_network().is_none());
        assert_eq!(render(&holder), 0.0);

        holder.clear_all_networks();
        assert!(holder.network_ids().is_empty());
    }

    #[test]
    fn project_networks_become_nodes() {
        let holder = Holder::default();
        let inner = offset("inner", 0.5).with_compilation(true);
        let outer = NetworkTree::new("outer")
            .with_compilation(true)
            .with_root(NodeTree::new("container.chain", "outer").with_child(NodeTree::new("project.inner", "embedded")));

        let order = holder.load_project(&[outer.clone(), inner]).unwrap();
        assert_eq!(order, ["inner", "outer"]);
        assert!(holder.context().registry.contains("project.outer"));

        holder.create_network(outer).unwrap();
        holder.prepare_to_play(44100.0, 2);
        assert_eq!(render(&holder), 0.5);
    }

    #[test]
    fn project_must_be_compilable() {
        let holder = Holder::default();
        let outer = NetworkTree::new("outer")
            .with_compilation(true)
            .with_root(NodeTree::new("container.chain", "outer").with_child(NodeTree::new("project.inner", "embedded")));
        let err = holder.load_project(&[outer, offset("inner", 0.5)]).unwrap_err();
        assert!(matches!(err, NetworkError::Config(_)));
        assert!(!holder.context().registry.contains("project.inner"));
    }
}
