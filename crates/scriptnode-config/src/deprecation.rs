//! Deprecated node configurations.
//!
//! Some configurations still load but can't be compiled into a project
//! library. [`check_if_deprecated`] inspects a single node,
//! [`check_before_compilation`] a whole network and reports every finding at
//! once.

use std::fmt;

use snex_core::DeprecationId;
use thiserror::Error;

use crate::description::{NetworkTree, NodeTree};

/// Factory path of the legacy math node.
pub const LEGACY_MATH_OP: &str = "math.op";

/// One deprecated node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprecatedNode {
    /// Node id.
    pub node: String,
    /// What is deprecated.
    pub id: DeprecationId,
}

impl fmt::Display for DeprecatedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.id.description())
    }
}

/// Every deprecated node of a network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{network} uses deprecated nodes: {}", .findings.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct DeprecationError {
    /// Network id.
    pub network: String,
    /// Findings in depth-first order.
    pub findings: Vec<DeprecatedNode>,
}

/// The first deprecated configuration of `node`, or [`DeprecationId::Ok`].
///
/// Children are not inspected.
pub fn check_if_deprecated(node: &NodeTree) -> DeprecationId {
    DeprecationId::CHECKED
        .into_iter()
        .find(|id| is_deprecated(node, *id))
        .unwrap_or(DeprecationId::Ok)
}

fn is_deprecated(node: &NodeTree, id: DeprecationId) -> bool {
    match id {
        DeprecationId::Ok => false,
        DeprecationId::OpTypeNonSet => {
            node.path == LEGACY_MATH_OP && !node.properties.contains_key("OpType")
        }
        DeprecationId::ConverterNotIdentity => node
            .properties
            .get("Converter")
            .is_some_and(|v| v.as_str() != Some("Identity")),
    }
}

/// Checks every node of `tree`.
pub fn check_before_compilation(tree: &NetworkTree) -> Result<(), DeprecationError> {
    let findings: Vec<DeprecatedNode> = tree
        .nodes()
        .filter_map(|n| match check_if_deprecated(n) {
            DeprecationId::Ok => None,
            id => Some(DeprecatedNode {
                node: n.id.clone(),
                id,
            }),
        })
        .collect();

    if findings.is_empty() {
        return Ok(());
    }

    for f in &findings {
        tracing::warn!(network = %tree.id, node = %f.node, "{}", f.id.description());
    }
    Err(DeprecationError {
        network: tree.id.clone(),
        findings,
    })
}
