//! Node configuration errors and the per-network exception registry.
//!
//! A [`NodeError`] describes why a node can't process in its current context
//! (wrong channel count, illegal block size, deprecated configuration...). It
//! is recorded in an [`ExceptionHandler`] keyed by node id instead of being
//! thrown, so that the rest of the network keeps running.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a node configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The node needs a different channel count.
    ChannelMismatch,
    /// The node needs a different block size.
    BlockSizeMismatch,
    /// The node needs a different sample rate.
    SampleRateMismatch,
    /// The node can't run inside a frame-based container.
    IllegalFrameCall,
    /// The host block size is not usable.
    IllegalBlockSize,
    /// The node failed to initialise.
    InitialisationError,
    /// More children than channels.
    TooManyChildNodes,
    /// The node needs a specific parent container.
    NoMatchingParent,
    /// A display buffer already has a writer.
    RingBufferMultipleWriters,
    /// The node is attached to a debugger.
    NodeDebuggerEnabled,
    /// The node uses a deprecated configuration.
    DeprecatedNode,
    /// The node can't run in a polyphonic network.
    IllegalPolyphony,
    /// The node's code failed to compile.
    CompileFail,
}

impl ErrorCode {
    /// Display name of mismatch codes.
    fn mismatch_name(self) -> Option<&'static str> {
        match self {
            ErrorCode::ChannelMismatch => Some("Channel amount mismatch"),
            ErrorCode::BlockSizeMismatch => Some("Blocksize mismatch"),
            ErrorCode::SampleRateMismatch => Some("Samplerate mismatch"),
            _ => None,
        }
    }
}

/// Deprecated node configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeprecationId {
    /// Nothing deprecated.
    Ok,
    /// A `math.op` node without an `OpType` property.
    OpTypeNonSet,
    /// A `Converter` property other than `Identity`.
    ConverterNotIdentity,
}

impl DeprecationId {
    /// Every deprecation that is checked.
    pub const CHECKED: [DeprecationId; 2] =
        [DeprecationId::OpTypeNonSet, DeprecationId::ConverterNotIdentity];

    /// Human-readable description.
    pub const fn description(self) -> &'static str {
        match self {
            DeprecationId::Ok => "No deprecation",
            DeprecationId::OpTypeNonSet => "math.op node without OpType, use a dedicated math node",
            DeprecationId::ConverterNotIdentity => {
                "Converter property is not Identity, use a converter node"
            }
        }
    }

    /// Numeric id stored in [`NodeError::actual`].
    pub const fn index(self) -> i32 {
        match self {
            DeprecationId::Ok => 0,
            DeprecationId::OpTypeNonSet => 1,
            DeprecationId::ConverterNotIdentity => 2,
        }
    }

    /// Inverse of [`index`](Self::index).
    pub const fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(DeprecationId::Ok),
            1 => Some(DeprecationId::OpTypeNonSet),
            2 => Some(DeprecationId::ConverterNotIdentity),
            _ => None,
        }
    }
}

impl fmt::Display for DeprecationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A node configuration error with the expected and actual value.
///
/// For [`ErrorCode::CompileFail`], `expected` holds the line and `actual`
/// the column. For [`ErrorCode::DeprecatedNode`], `actual` holds the
/// [`DeprecationId`] index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[error("{}", self.message())]
pub struct NodeError {
    /// Error kind.
    pub code: ErrorCode,
    /// Value the node requires.
    pub expected: i32,
    /// Value the node got.
    pub actual: i32,
}

impl NodeError {
    /// Error with expected and actual values.
    pub const fn new(code: ErrorCode, expected: i32, actual: i32) -> Self {
        Self {
            code,
            expected,
            actual,
        }
    }

    /// Error without values.
    pub const fn simple(code: ErrorCode) -> Self {
        Self::new(code, 0, 0)
    }

    /// Deprecation error.
    pub const fn deprecated(id: DeprecationId) -> Self {
        Self::new(ErrorCode::DeprecatedNode, 0, id.index())
    }

    /// Compile error at a source location.
    pub const fn compile_fail(line: i32, column: i32) -> Self {
        Self::new(ErrorCode::CompileFail, line, column)
    }

    /// Rendered message.
    pub fn message(&self) -> String {
        match self.code {
            ErrorCode::ChannelMismatch
            | ErrorCode::BlockSizeMismatch
            | ErrorCode::SampleRateMismatch => format!(
                "{}: {} (expected: {})",
                self.code.mismatch_name().unwrap_or_default(),
                self.actual,
                self.expected
            ),
            ErrorCode::IllegalFrameCall => "Can't be used in frame processing context".into(),
            ErrorCode::IllegalBlockSize => format!("Illegal block size: {}", self.actual),
            ErrorCode::InitialisationError => "Initialisation error".into(),
            ErrorCode::TooManyChildNodes => format!(
                "Number of child nodes ({}) exceed channels ({}).",
                self.actual, self.expected
            ),
            ErrorCode::NoMatchingParent => "Can't find suitable parent node".into(),
            ErrorCode::RingBufferMultipleWriters => "Buffer used multiple times".into(),
            ErrorCode::NodeDebuggerEnabled => "Node is being debugged".into(),
            ErrorCode::DeprecatedNode => DeprecationId::from_index(self.actual)
                .map_or("Deprecated node", DeprecationId::description)
                .into(),
            ErrorCode::IllegalPolyphony => "Can't use this node in a polyphonic network".into(),
            ErrorCode::CompileFail => format!(
                "Compilation error at Line {}, Column {}",
                self.expected, self.actual
            ),
        }
    }
}

/// Per-network registry: node id to at most one error.
#[derive(Debug, Clone, Default)]
pub struct ExceptionHandler {
    items: Vec<(String, NodeError)>,
}

impl ExceptionHandler {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` for `node_id`, replacing a previous error.
    pub fn add_error(&mut self, node_id: &str, error: NodeError) {
        match self.items.iter_mut().find(|(id, _)| id == node_id) {
            Some(item) => item.1 = error,
            None => self.items.push((node_id.to_string(), error)),
        }
    }

    /// Removes the error of `node_id` (every node if `None`).
    ///
    /// With `code == None` every code except [`ErrorCode::DeprecatedNode`] is
    /// removed; deprecation errors only go away when asked for explicitly.
    pub fn remove_error(&mut self, node_id: Option<&str>, code: Option<ErrorCode>) {
        self.items.retain(|(id, e)| {
            let node_matches = node_id.is_none_or(|n| n == id);
            let code_matches = match code {
                Some(c) => e.code == c,
                None => e.code != ErrorCode::DeprecatedNode,
            };
            !(node_matches && code_matches)
        });
    }

    /// The error recorded for `node_id`.
    pub fn error(&self, node_id: &str) -> Option<NodeError> {
        self.items
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, e)| *e)
    }

    /// Whether `node_id` has an error.
    pub fn is_bypassed(&self, node_id: &str) -> bool {
        self.error(node_id).is_some()
    }

    /// Whether any error is recorded.
    pub fn is_ok(&self) -> bool {
        self.items.is_empty()
    }

    /// Rendered message for `node_id`, empty if there is none.
    pub fn error_message(&self, node_id: &str) -> String {
        self.error(node_id).map(|e| e.message()).unwrap_or_default()
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeError)> {
        self.items.iter().map(|(id, e)| (id.as_str(), e))
    }

    /// Number of nodes with an error.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no error is recorded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_formats() {
        assert_eq!(
            NodeError::new(ErrorCode::ChannelMismatch, 2, 1).to_string(),
            "Channel amount mismatch: 1 (expected: 2)"
        );
        assert_eq!(
            NodeError::new(ErrorCode::IllegalBlockSize, 0, 13).to_string(),
            "Illegal block size: 13"
        );
        assert_eq!(
            NodeError::new(ErrorCode::TooManyChildNodes, 2, 3).to_string(),
            "Number of child nodes (3) exceed channels (2)."
        );
        assert_eq!(
            NodeError::compile_fail(4, 12).to_string(),
            "Compilation error at Line 4, Column 12"
        );
        assert_eq!(
            NodeError::deprecated(DeprecationId::OpTypeNonSet).to_string(),
            DeprecationId::OpTypeNonSet.description()
        );
        assert_eq!(
            NodeError::simple(ErrorCode::RingBufferMultipleWriters).to_string(),
            "Buffer used multiple times"
        );
    }

    #[test]
    fn add_error_overwrites() {
        let mut h = ExceptionHandler::new();
        h.add_error("gain", NodeError::simple(ErrorCode::InitialisationError));
        h.add_error("gain", NodeError::new(ErrorCode::ChannelMismatch, 2, 1));

        assert_eq!(h.len(), 1);
        assert_eq!(h.error("gain").map(|e| e.code), Some(ErrorCode::ChannelMismatch));
    }

    #[test]
    fn remove_any_keeps_deprecations() {
        let mut h = ExceptionHandler::new();
        h.add_error("a", NodeError::simple(ErrorCode::IllegalFrameCall));
        h.add_error("b", NodeError::deprecated(DeprecationId::ConverterNotIdentity));

        h.remove_error(None, None);
        assert!(!h.is_bypassed("a"));
        assert!(h.is_bypassed("b"));

        h.remove_error(Some("b"), Some(ErrorCode::DeprecatedNode));
        assert!(h.is_ok());
    }

    #[test]
    fn remove_specific_code_only() {
        let mut h = ExceptionHandler::new();
        h.add_error("a", NodeError::simple(ErrorCode::IllegalFrameCall));
        h.remove_error(Some("a"), Some(ErrorCode::ChannelMismatch));
        assert!(h.is_bypassed("a"));
        h.remove_error(Some("other"), None);
        assert!(h.is_bypassed("a"));
        h.remove_error(Some("a"), None);
        assert!(!h.is_bypassed("a"));
    }

    #[test]
    fn deprecation_index_round_trip() {
        for id in DeprecationId::CHECKED {
            assert_eq!(DeprecationId::from_index(id.index()), Some(id));
        }
        assert_eq!(DeprecationId::from_index(99), None);
    }
}
