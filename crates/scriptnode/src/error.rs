//! Error types for network operations.

use scriptnode_config::{ConfigError, DeprecationError, ValidationError};
use scriptnode_registry::RegistryError;
use snex_core::NodeError;
use thiserror::Error;

/// Errors of structural edits, freezing and embedding.
///
/// Audio-path operations never fail; these errors come from the control
/// thread only.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The description is structurally invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A node couldn't be created.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Loading or ordering descriptions failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The network uses deprecated nodes.
    #[error(transparent)]
    Deprecated(#[from] DeprecationError),

    /// No node with this id.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// The node has no parameter with this id.
    #[error("{node} has no parameter {parameter}")]
    UnknownParameter {
        /// Node id.
        node: String,
        /// Parameter id.
        parameter: String,
    },

    /// No network parameter with this id.
    #[error("unknown network parameter: {0}")]
    UnknownNetworkParameter(String),

    /// Nodes can only be added to containers.
    #[error("{0} is not a container")]
    NotAContainer(String),

    /// The root node can't be moved or removed.
    #[error("{0} is the root node")]
    RootNode(String),

    /// The project library has no node for the network.
    #[error("no compiled node for {0}")]
    NotCompiled(String),

    /// The compiled node was built from a different description.
    #[error("{network} changed since it was compiled (compiled {compiled:#018x}, current {current:#018x})")]
    HashMismatch {
        /// Network id.
        network: String,
        /// Hash stored in the library.
        compiled: u64,
        /// Hash of the current description.
        current: u64,
    },

    /// An embedded network has more parameters than an opaque node exposes.
    #[error("{network} has {actual} parameters, at most {max} can be embedded")]
    TooManyParameters {
        /// Network id.
        network: String,
        /// Parameter count of the network.
        actual: usize,
        /// Limit.
        max: usize,
    },

    /// No network with this id in the holder.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    /// Parameter data isn't a JSON object of numbers.
    #[error("invalid parameter data: {0}")]
    ParameterData(String),

    /// A node rejected a prepare call or a data binding.
    #[error("{node}: {error}")]
    Node {
        /// Node id.
        node: String,
        /// What the node reported.
        error: NodeError,
    },
}

impl NetworkError {
    /// The node error wrapped by [`NetworkError::Node`].
    pub fn node_error(&self) -> Option<NodeError> {
        match self {
            NetworkError::Node { error, .. } => Some(*error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use snex_core::ErrorCode;

    use super::*;

    #[test]
    fn error_display() {
        let err = NetworkError::Node {
            node: "peak".into(),
            error: NodeError::simple(ErrorCode::RingBufferMultipleWriters),
        };
        assert_eq!(err.to_string(), "peak: Buffer used multiple times");
        assert_eq!(err.node_error().map(|e| e.code), Some(ErrorCode::RingBufferMultipleWriters));

        let err = NetworkError::HashMismatch {
            network: "main".into(),
            compiled: 1,
            current: 2,
        };
        assert!(err.to_string().starts_with("main changed since it was compiled"));
        assert!(NetworkError::UnknownNode("x".into()).node_error().is_none());
    }
}
