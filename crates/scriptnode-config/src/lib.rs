//! Network descriptions and engine configuration for scriptnode.
//!
//! This crate holds everything about a network that can be written to disk:
//! the declarative node tree, the engine settings a host prepares networks
//! with, and the checks that run before networks are compiled into a project
//! library.
//!
//! # Features
//!
//! - **Descriptions**: [`NetworkTree`] / [`NodeTree`] in TOML or JSON, picked
//!   by file extension, with normalized write-back and a structural hash
//! - **Validation**: ids, factory paths and connection targets
//! - **Deprecation**: configurations that can't be compiled any more
//! - **Includes**: ordering of project networks that embed each other
//! - **Engine**: sample rate, block size, channels and voices
//!
//! # Example
//!
//! ```rust,no_run
//! use scriptnode_config::{NetworkTree, NodeTree, ParameterTree, validate_network};
//!
//! let tree = NetworkTree::new("main")
//!     .with_parameter(ParameterTree::new("Volume", 0.5).with_connection("gain", "Gain"))
//!     .with_root(
//!         NodeTree::new("container.chain", "main")
//!             .with_child(NodeTree::new("core.gain", "gain")),
//!     );
//!
//! validate_network(&tree).unwrap();
//! tree.save("networks/main.toml").unwrap();
//!
//! let loaded = NetworkTree::load("networks/main.toml").unwrap();
//! assert_eq!(loaded.content_hash(), tree.content_hash());
//! ```

mod description;
mod engine;
mod error;

/// Deprecated node configurations.
pub mod deprecation;

/// Project include ordering.
pub mod includes;

/// Structural validation.
pub mod validation;

pub use deprecation::{DeprecatedNode, DeprecationError, check_before_compilation, check_if_deprecated};
pub use description::{
    Connection, DataSlot, Format, NetworkTree, NodeIter, NodeTree, PROJECT_PREFIX, ParameterTree,
    PropertyValue, default_property,
};
pub use engine::EngineConfig;
pub use error::ConfigError;
pub use includes::sort_includes;
pub use validation::{ValidationError, ValidationResult, validate_network, validate_node};
