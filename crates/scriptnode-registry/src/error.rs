//! Error types for node creation.

use thiserror::Error;

/// Errors that can occur when creating nodes from paths or descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No node is registered under the path.
    #[error("unknown node path: {0}")]
    UnknownPath(String),

    /// The path names a container, which has no leaf object.
    #[error("{0} is a container")]
    NotALeaf(String),

    /// A property holds a value the node doesn't understand.
    #[error("invalid value '{value}' for property {property} of {node}")]
    InvalidProperty {
        /// Node id.
        node: String,
        /// Property name.
        property: String,
        /// Rejected value.
        value: String,
    },

    /// A SNEX node was requested but no compiler is set.
    #[error("no SNEX compiler available for {0}")]
    NoCompiler(String),

    /// The factory failed to build the node.
    #[error("can't create {path}: {reason}")]
    Creation {
        /// Factory path.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A leaf node has children in its description.
    #[error("{node} ({path}) can't have child nodes")]
    UnexpectedChildren {
        /// Node id.
        node: String,
        /// Factory path.
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            RegistryError::UnknownPath("core.reverb".into()).to_string(),
            "unknown node path: core.reverb"
        );
        let err = RegistryError::InvalidProperty {
            node: "op".into(),
            property: "OpType".into(),
            value: "pow".into(),
        };
        assert_eq!(err.to_string(), "invalid value 'pow' for property OpType of op");
    }
}
