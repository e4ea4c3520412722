//! Structural validation of network descriptions.
//!
//! Checks what can be checked without knowing the node factories: ids are
//! present and unique, factory paths are not empty, and every connection
//! points at a node of the same network. Factory paths themselves are checked
//! by the node registry when the network is built.
//!
//! # Example
//!
//! ```rust
//! use scriptnode_config::{NetworkTree, NodeTree, validate_network};
//!
//! let tree = NetworkTree::new("main").with_root(
//!     NodeTree::new("container.chain", "main").with_child(NodeTree::new("core.gain", "gain")),
//! );
//! validate_network(&tree).expect("valid network");
//! ```

use std::collections::BTreeSet;

use thiserror::Error;

use crate::description::{Connection, NetworkTree, NodeTree};

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A node has an empty id.
    #[error("node with path '{0}' has an empty id")]
    EmptyId(String),

    /// A node has an empty factory path.
    #[error("node '{0}' has an empty factory path")]
    EmptyPath(String),

    /// Two nodes share an id.
    #[error("duplicate node id: {0}")]
    DuplicateId(String),

    /// A connection points at a node that doesn't exist.
    #[error("'{source_id}' connects to unknown node '{node}'")]
    UnknownConnectionTarget {
        /// Parameter or node the connection starts at.
        source_id: String,
        /// Missing target node.
        node: String,
    },

    /// Two network parameters share an id.
    #[error("duplicate network parameter: {0}")]
    DuplicateParameter(String),

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a network description, collecting every problem.
pub fn validate_network(tree: &NetworkTree) -> ValidationResult<()> {
    let mut errors = Vec::new();
    let mut ids = BTreeSet::new();

    for node in tree.nodes() {
        if node.id.is_empty() {
            errors.push(ValidationError::EmptyId(node.path.clone()));
        } else if !ids.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateId(node.id.clone()));
        }
        if node.path.is_empty() {
            errors.push(ValidationError::EmptyPath(node.id.clone()));
        }
    }

    let mut check = |source: &str, connections: &[Connection]| {
        for c in connections {
            if !ids.contains(c.node.as_str()) {
                errors.push(ValidationError::UnknownConnectionTarget {
                    source_id: source.to_string(),
                    node: c.node.clone(),
                });
            }
        }
    };

    for p in &tree.parameters {
        check(&p.id, &p.connections);
    }
    for node in tree.nodes() {
        check(&node.id, &node.modulation);
        for p in &node.parameters {
            check(&format!("{}.{}", node.id, p.id), &p.connections);
        }
    }

    let mut params = BTreeSet::new();
    for p in &tree.parameters {
        if !params.insert(p.id.as_str()) {
            errors.push(ValidationError::DuplicateParameter(p.id.clone()));
        }
    }

    collapse(errors)
}

/// Validates a single node subtree: ids present and unique.
pub fn validate_node(node: &NodeTree) -> ValidationResult<()> {
    let mut errors = Vec::new();
    let mut ids = BTreeSet::new();
    for n in node.iter() {
        if n.id.is_empty() {
            errors.push(ValidationError::EmptyId(n.path.clone()));
        } else if !ids.insert(n.id.as_str()) {
            errors.push(ValidationError::DuplicateId(n.id.clone()));
        }
    }
    collapse(errors)
}

fn collapse(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::ParameterTree;

    fn chain(children: Vec<NodeTree>) -> NetworkTree {
        let mut root = NodeTree::new("container.chain", "main");
        root.nodes = children;
        NetworkTree::new("main").with_root(root)
    }

    #[test]
    fn valid_network_passes() {
        let tree = chain(vec![
            NodeTree::new("core.peak", "peak").with_modulation("gain", "Gain"),
            NodeTree::new("core.gain", "gain"),
        ])
        .with_parameter(ParameterTree::new("Volume", 0.5).with_connection("gain", "Gain"));
        assert!(validate_network(&tree).is_ok());
    }

    #[test]
    fn duplicate_id_is_reported() {
        let tree = chain(vec![
            NodeTree::new("core.gain", "gain"),
            NodeTree::new("core.gain", "gain"),
        ]);
        assert_eq!(
            validate_network(&tree),
            Err(ValidationError::DuplicateId("gain".into()))
        );
    }

    #[test]
    fn unknown_targets_are_collected() {
        let tree = chain(vec![NodeTree::new("core.peak", "peak").with_modulation("nope", "Gain")])
            .with_parameter(ParameterTree::new("Volume", 0.5).with_connection("missing", "Gain"));

        match validate_network(&tree) {
            Err(ValidationError::Multiple(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().all(|e| matches!(e, ValidationError::UnknownConnectionTarget { .. })));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn empty_id_and_path() {
        let tree = chain(vec![NodeTree::new("", "")]);
        let err = validate_network(&tree).unwrap_err();
        assert!(err.to_string().contains("empty id"));
        assert!(err.to_string().contains("empty factory path"));
    }

    #[test]
    fn duplicate_parameters() {
        let tree = chain(Vec::new())
            .with_parameter(ParameterTree::new("A", 0.0))
            .with_parameter(ParameterTree::new("A", 1.0));
        assert_eq!(
            validate_network(&tree),
            Err(ValidationError::DuplicateParameter("A".into()))
        );
    }

    #[test]
    fn node_subtree_validation() {
        let node = NodeTree::new("container.chain", "c")
            .with_child(NodeTree::new("core.gain", "c"));
        assert!(validate_node(&node).is_err());
    }
}
