//! A whole network behind the [`NodeObject`] interface.
//!
//! [`OpaqueNetworkHolder`] is how compiled project networks and `project.*`
//! nodes embed one network into another. The holder can exist before its
//! network: parameter values and data bindings set in the meantime are kept
//! and replayed once the network is attached.

use std::any::Any;
use std::sync::Arc;

use scriptnode_config::NetworkTree;
use snex_core::{
    DataType, ErrorCode, ExternalData, HiseEvent, NodeError, NodeObject, ParameterSpec, PrepareSpecs, ProcessData,
};

use crate::error::NetworkError;
use crate::network::DspNetwork;

/// Parameters an opaque node exposes.
pub const MAX_OPAQUE_PARAMETERS: usize = 16;

/// Runs an embedded [`DspNetwork`] as a node.
#[derive(Debug, Default)]
pub struct OpaqueNetworkHolder {
    network: Option<Arc<DspNetwork>>,
    values: [f64; MAX_OPAQUE_PARAMETERS],
    written: u16,
    pending: Vec<(usize, ExternalData)>,
    specs: Option<PrepareSpecs>,
}

impl OpaqueNetworkHolder {
    /// A holder without network. Processing passes audio through.
    pub fn new() -> Self {
        Self::default()
    }

    /// A holder running `network`.
    pub fn with_network(network: Arc<DspNetwork>) -> Result<Self, NetworkError> {
        let mut holder = Self::new();
        holder.set_network(network)?;
        Ok(holder)
    }

    /// Attaches `network`.
    ///
    /// Data bindings and parameter values received so far are replayed, and
    /// the network is prepared if the holder already was.
    ///
    /// # Errors
    ///
    /// Fails if the network has more than [`MAX_OPAQUE_PARAMETERS`]
    /// parameters or refuses a pending data binding. Every pending binding
    /// is still offered to the network; on failure the network isn't
    /// attached and the pending bindings are kept for the next attempt.
    pub fn set_network(&mut self, network: Arc<DspNetwork>) -> Result<(), NetworkError> {
        let actual = network.parameter_ids().len();
        if actual > MAX_OPAQUE_PARAMETERS {
            return Err(NetworkError::TooManyParameters {
                network: network.id().to_string(),
                actual,
                max: MAX_OPAQUE_PARAMETERS,
            });
        }

        let mut refused = None;
        for (index, data) in &self.pending {
            if let Err(e) = network.set_external_data(data.clone(), *index) {
                tracing::warn!(
                    network = %network.id(),
                    index,
                    error = %e,
                    "embedded network refused data"
                );
                refused.get_or_insert(e);
            }
        }
        if let Some(e) = refused {
            return Err(e);
        }
        self.pending.clear();
        for (i, v) in self.values.iter().enumerate().take(actual) {
            if self.written & (1 << i) != 0 {
                network.set_network_parameter(i, *v);
            }
        }
        if let Some(specs) = &self.specs {
            network.prepare(specs);
        }

        tracing::debug!(network = %network.id(), parameters = actual, "attached embedded network");
        self.network = Some(network);
        Ok(())
    }

    /// The embedded network.
    pub fn network(&self) -> Option<&Arc<DspNetwork>> {
        self.network.as_ref()
    }

    /// Last value set for parameter `index`.
    pub fn parameter(&self, index: usize) -> Option<f64> {
        match &self.network {
            Some(network) => network.parameter_specs().get(index).map(|p| p.default),
            None => self.values.get(index).copied(),
        }
    }
}

impl NodeObject for OpaqueNetworkHolder {
    fn prepare(&mut self, specs: &PrepareSpecs) -> Result<(), NodeError> {
        self.specs = Some(specs.clone());
        let Some(network) = &self.network else {
            return Ok(());
        };
        network.prepare(specs);
        let failed = network
            .exceptions()
            .iter()
            .find(|(_, e)| e.code != ErrorCode::DeprecatedNode)
            .map(|(node, e)| (node.to_string(), *e));
        match failed {
            Some((node, error)) => {
                tracing::debug!(network = %network.id(), %node, %error, "embedded network failed to prepare");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        if let Some(network) = &self.network {
            network.process(data);
        }
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        if let Some(network) = &self.network {
            network.process_frame(frame);
        }
    }

    fn reset(&mut self) {
        if let Some(network) = &self.network {
            network.reset();
        }
    }

    fn handle_hise_event(&mut self, event: &mut HiseEvent) {
        if let Some(network) = &self.network {
            network.handle_hise_event(event);
        }
    }

    fn set_parameter(&mut self, index: usize, value: f64) {
        let Some(slot) = self.values.get_mut(index) else {
            return;
        };
        *slot = value;
        self.written |= 1 << index;
        if let Some(network) = &self.network {
            network.set_network_parameter(index, value);
        }
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        self.network
            .as_ref()
            .map(|n| n.parameter_specs())
            .unwrap_or_default()
    }

    fn set_external_data(&mut self, data: &ExternalData, index: usize) -> Result<(), NodeError> {
        let Some(network) = &self.network else {
            self.pending.retain(|(i, d)| *i != index || d.data_type() != data.data_type());
            self.pending.push((index, data.clone()));
            return Ok(());
        };
        network.set_external_data(data.clone(), index).map_err(|e| {
            e.node_error()
                .unwrap_or(NodeError::simple(ErrorCode::InitialisationError))
        })
    }

    fn data_slots(&self, data_type: DataType) -> usize {
        self.network
            .as_ref()
            .map_or(0, |n| HostHelpers::num_max_data_objects(&n.description(), data_type))
    }

    fn handle_modulation(&mut self) -> Option<f64> {
        self.network.as_ref().and_then(|n| n.handle_modulation())
    }

    fn is_polyphonic(&self) -> bool {
        self.network.as_ref().is_some_and(|n| n.is_polyphonic())
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

/// Helpers for hosts that embed networks.
#[derive(Debug, Clone, Copy)]
pub struct HostHelpers;

impl HostHelpers {
    /// Number of data slots of `data_type` the network uses.
    pub fn num_max_data_objects(tree: &NetworkTree, data_type: DataType) -> usize {
        tree.num_data_objects(data_type)
    }

    /// Builds a network from `tree` and attaches it to `opaque`.
    ///
    /// The network is built with the context of `parent` and shares its
    /// voice context.
    pub fn init_node_with_network(
        parent: &Arc<DspNetwork>,
        tree: &NetworkTree,
        opaque: &mut OpaqueNetworkHolder,
    ) -> Result<Arc<DspNetwork>, NetworkError> {
        let network = Arc::new(DspNetwork::new(tree.clone(), parent.context().clone())?);
        network.set_parent_network(parent);
        opaque.set_network(Arc::clone(&network))?;
        Ok(network)
    }
}
