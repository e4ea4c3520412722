//! Scriptnode - DSP network runtime
//!
//! Builds node trees from [`scriptnode_config`] descriptions and runs them:
//!
//! - **[`DspNetwork`]**: a live tree with network parameters, modulation,
//!   data slots, selection, undo and transactional structural edits
//! - **Freeze**: swap the interpreted tree for a compiled node from a
//!   [`ProjectLibrary`] when its hash matches the description
//! - **[`OpaqueNetworkHolder`]**: a whole network as one node, used for
//!   embedding and for `project.*` nodes
//! - **[`Holder`]**: the networks of a host and the one that renders audio
//!
//! ## Example
//!
//! ```rust
//! use scriptnode::{Holder, NetworkContext};
//! use scriptnode_config::{NetworkTree, NodeTree, ParameterTree};
//! use snex_core::AudioBuffer;
//!
//! let holder = Holder::new(NetworkContext::default());
//! let network = holder
//!     .create_network(
//!         NetworkTree::new("main")
//!             .with_parameter(ParameterTree::new("Level", 1.0).with_connection("mul", "Value"))
//!             .with_root(NodeTree::new("container.chain", "main").with_child(NodeTree::new("math.mul", "mul"))),
//!     )
//!     .unwrap();
//!
//! holder.prepare_to_play(48000.0, 8);
//! network.set_network_parameter_by_id("Level", 0.5).unwrap();
//!
//! let mut buffer = AudioBuffer::from_channels(&[vec![1.0; 8], vec![-1.0; 8]]);
//! holder.process(&mut buffer.as_process_data());
//! assert_eq!(buffer.channel(1), &[-0.5; 8]);
//! ```

pub mod error;
pub mod holder;
pub mod library;
pub mod network;
pub mod opaque;

pub use error::NetworkError;
pub use holder::Holder;
pub use library::{NodeInitializer, ProjectLibrary, StaticProjectLibrary, WrapperType};
pub use network::{DEFAULT_NUM_CHANNELS, DspNetwork, MAX_UNDO_STEPS, NetworkContext, non_existent_id};
pub use opaque::{HostHelpers, MAX_OPAQUE_PARAMETERS, OpaqueNetworkHolder};
