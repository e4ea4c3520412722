//! SNEX Core - type system, function registry and compiled nodes
//!
//! This crate holds everything a DSP network needs to talk to compiled SNEX
//! code, plus the runtime types shared by every node.
//!
//! # Core Abstractions
//!
//! ## Type System
//!
//! - [`TypeInfo`] - Native scalar or reference to a [`ComplexType`]
//! - [`StructType`], [`SpanType`], [`DynType`] - Aggregates with a two-phase
//!   layout (declare members, then finalise once)
//! - [`Symbol`] - Qualified identifier with type and optional constant
//!
//! ## Function Registry
//!
//! - [`FunctionData`] - Signature plus function pointer and/or [`Inliner`]
//! - [`FunctionClass`] - Named collection of functions, nested classes and
//!   constants with exact overload resolution
//! - [`math_function_class`] - The `Math` class with inlineable free functions
//!
//! ## Compiled Nodes
//!
//! - [`SnexCompiler`] - Produces a [`CompiledClass`] from code
//! - [`JitCompiledNode`] - One compiled instance driven through its callbacks
//! - [`NodeObject`] - The contract every processing unit implements
//!
//! ## Runtime
//!
//! - [`PrepareSpecs`], [`ProcessData`], [`HiseEvent`] - Callback arguments
//! - [`PolyData`], [`PolyHandler`], [`VoiceSetter`] - Per-voice state
//! - [`ExternalData`] - Tables, slider packs, audio files, display buffers
//! - [`ExceptionHandler`] - Per-node configuration errors
//!
//! # Example
//!
//! ```rust
//! use snex_core::{NativeType, Symbol, TypeInfo, math_function_class};
//!
//! let math = math_function_class();
//! let abs = math
//!     .resolve(&Symbol::parse("Math::abs"), &[TypeInfo::native(NativeType::Float)])
//!     .unwrap();
//! assert!(abs.can_be_inlined(true));
//! ```
//!
//! # Features
//!
//! - `tracing` - Emit `tracing` events from the compiler boundary

pub mod compiler;
pub mod complex;
pub mod error;
pub mod event;
pub mod exception;
pub mod external_data;
pub mod function;
pub mod function_class;
pub mod inline;
pub mod jit_node;
pub mod math;
pub mod math_class;
pub mod node;
pub mod object;
pub mod param;
pub mod poly;
pub mod process;
pub mod smoothing;
pub mod specs;
pub mod symbol;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use compiler::{
    CallbackId, ClassDefinition, CompileError, CompileResult, CompiledClass, NativeClassCompiler,
    ParameterDefinition, SnexCompiler,
};
pub use complex::{
    ComplexKind, ComplexType, DynType, Initialiser, InitialiserList, Member, SpanType, StructType,
};
pub use error::{ResolveError, TypeError};
pub use event::{EventType, HiseEvent};
pub use exception::{DeprecationId, ErrorCode, ExceptionHandler, NodeError};
pub use external_data::{
    AudioFile, DataHolder, DataType, DisplayBuffer, DisplayBufferWriter, ExternalData,
    ExternalDataHolder, SliderPack, Table,
};
pub use function::{FunctionData, FunctionPointer, Inliner};
pub use function_class::{ApiClass, FunctionClass, SpecialSymbol};
pub use inline::{AsmInlineData, Expr, InlineData, Instruction, SyntaxTreeInlineData};
pub use jit_node::JitCompiledNode;
pub use math_class::math_function_class;
pub use node::{NodeObject, NodeRequirements, ParameterSpec};
pub use object::ObjectMemory;
pub use param::ParameterRange;
pub use poly::{DEFAULT_NUM_VOICES, PolyData, PolyHandler, VoiceAllocator, VoiceSetter};
pub use process::{AudioBuffer, MAX_CHANNELS, ProcessData};
pub use smoothing::LinearSmoothedValue;
pub use specs::PrepareSpecs;
pub use symbol::Symbol;
pub use types::{ComplexTypePtr, TypeInfo};
pub use value::{NativeType, Value};
