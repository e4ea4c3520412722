//! The compiler boundary.
//!
//! A [`SnexCompiler`] turns SNEX source into a [`CompiledClass`]: a finalised
//! object layout plus the resolved callback table that a
//! [`JitCompiledNode`](crate::JitCompiledNode) drives. The parser and code
//! generator live outside this crate; [`NativeClassCompiler`] resolves class
//! ids against classes implemented in Rust and registered up front.
//!
//! # Callback signatures
//!
//! | Callback | Signature |
//! |----------|-----------|
//! | `prepare` | `void prepare(PrepareSpecs)` |
//! | `process` | `void process(ProcessData<N>&)` |
//! | `processFrame` | `void processFrame(span<float, N>&)` |
//! | `reset` | `void reset()` |
//! | `handleEvent` | `void handleEvent(HiseEvent&)` |
//!
//! `N` is the channel count requested from the compiler. A class whose
//! callbacks were declared for a different channel count fails to build.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::complex::{ComplexType, Initialiser, SpanType, StructType};
use crate::error::TypeError;
use crate::event::HiseEvent;
use crate::exception::NodeError;
use crate::external_data::{DataType, ExternalData};
use crate::function::{FunctionData, FunctionPointer};
use crate::function_class::FunctionClass;
use crate::node::NodeRequirements;
use crate::object::ObjectMemory;
use crate::param::ParameterRange;
use crate::process::ProcessData;
use crate::specs::PrepareSpecs;
use crate::types::TypeInfo;
use crate::value::{NativeType, Value};

/// A compilation failure at a source location.
///
/// Lines and columns are 1-based; `0` means the location is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Line {line}, Column {column}: {message}")]
pub struct CompileError {
    /// What went wrong.
    pub message: String,
    /// Source line.
    pub line: i32,
    /// Source column.
    pub column: i32,
}

impl CompileError {
    /// An error without location.
    pub fn new(message: impl Into<String>) -> Self {
        Self::at(message, 0, 0)
    }

    /// An error at `line`, `column`.
    pub fn at(message: impl Into<String>, line: i32, column: i32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    /// Whether a location is attached.
    pub fn has_location(&self) -> bool {
        self.line > 0
    }

    /// The node error recorded for a node whose code failed to compile.
    pub fn to_node_error(&self) -> NodeError {
        NodeError::compile_fail(self.line, self.column)
    }
}

impl From<TypeError> for CompileError {
    fn from(err: TypeError) -> Self {
        Self::new(err.to_string())
    }
}

/// Result of a compilation step.
pub type CompileResult<T> = Result<T, CompileError>;

/// Index into the callback table of a compiled class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackId {
    /// `prepare(PrepareSpecs)`
    Prepare,
    /// `process(ProcessData<N>&)`
    Process,
    /// `processFrame(span<float, N>&)`
    ProcessFrame,
    /// `reset()`
    Reset,
    /// `handleEvent(HiseEvent&)`
    HandleEvent,
}

impl CallbackId {
    /// Every callback, in table order.
    pub const ALL: [CallbackId; 5] = [
        CallbackId::Prepare,
        CallbackId::Process,
        CallbackId::ProcessFrame,
        CallbackId::Reset,
        CallbackId::HandleEvent,
    ];

    /// Table index.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Name used in SNEX code.
    pub const fn name(self) -> &'static str {
        match self {
            CallbackId::Prepare => "prepare",
            CallbackId::Process => "process",
            CallbackId::ProcessFrame => "processFrame",
            CallbackId::Reset => "reset",
            CallbackId::HandleEvent => "handleEvent",
        }
    }

    /// Whether a class may omit this callback.
    pub const fn is_optional(self) -> bool {
        matches!(
            self,
            CallbackId::Prepare | CallbackId::Reset | CallbackId::HandleEvent
        )
    }

    /// Expected argument types for a class with `num_channels` channels.
    pub fn argument_types(self, num_channels: usize) -> Result<Vec<TypeInfo>, TypeError> {
        Ok(match self {
            CallbackId::Prepare => vec![prepare_specs_type()?],
            CallbackId::Process => vec![process_data_type(num_channels)?],
            CallbackId::ProcessFrame => vec![frame_type(num_channels)?],
            CallbackId::Reset => Vec::new(),
            CallbackId::HandleEvent => vec![TypeInfo::native(NativeType::Event).with_ref(true)],
        })
    }

    fn accepts(self, pointer: &FunctionPointer) -> bool {
        matches!(
            (self, pointer),
            (CallbackId::Prepare, FunctionPointer::Prepare(_))
                | (CallbackId::Process, FunctionPointer::Process(_))
                | (CallbackId::ProcessFrame, FunctionPointer::ProcessFrame(_))
                | (CallbackId::Reset, FunctionPointer::Reset(_))
                | (CallbackId::HandleEvent, FunctionPointer::HandleEvent(_))
        )
    }
}

fn finalised_struct(id: &str, members: &[(&str, NativeType)]) -> Result<TypeInfo, TypeError> {
    let t = StructType::new(id);
    for (name, native) in members {
        t.add_member(*name, TypeInfo::native(*native), None)?;
    }
    t.finalise_alignment()?;
    Ok(TypeInfo::complex(Arc::new(t)))
}

/// `PrepareSpecs` as a SNEX struct.
pub fn prepare_specs_type() -> Result<TypeInfo, TypeError> {
    finalised_struct(
        "PrepareSpecs",
        &[
            ("sampleRate", NativeType::Double),
            ("blockSize", NativeType::Integer),
            ("numChannels", NativeType::Integer),
        ],
    )
}

/// `ProcessData<N>` as a SNEX struct.
pub fn process_data_type(num_channels: usize) -> Result<TypeInfo, TypeError> {
    finalised_struct(
        &format!("ProcessData<{num_channels}>"),
        &[
            ("data", NativeType::Block),
            ("numSamples", NativeType::Integer),
        ],
    )
}

/// `span<float, N>`, the frame type of a class with `N` channels.
pub fn frame_type(num_channels: usize) -> Result<TypeInfo, TypeError> {
    let t = SpanType::new(NativeType::Float.into(), num_channels);
    t.finalise_alignment()?;
    Ok(TypeInfo::complex(Arc::new(t)))
}

fn noop_prepare(_: &mut ObjectMemory, _: &PrepareSpecs) {}
fn noop_reset(_: &mut ObjectMemory) {}
fn noop_event(_: &mut ObjectMemory, _: &mut HiseEvent) {}

/// A parameter setter of a compiled class.
#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    /// Parameter name.
    pub name: String,
    /// Value range.
    pub range: ParameterRange,
    /// Initial value.
    pub default: f64,
    /// `void setParameter<P>(double)`
    pub function: FunctionData,
}

/// Builder for a natively implemented SNEX class.
///
/// ```rust
/// use snex_core::compiler::{ClassDefinition, NativeClassCompiler, SnexCompiler};
/// use snex_core::{NativeType, ObjectMemory, ProcessData, Value};
///
/// fn process(obj: &mut ObjectMemory, data: &mut ProcessData<'_>) {
///     let gain = obj.float(0);
///     for ch in data.channels_mut() {
///         ch.iter_mut().for_each(|s| *s *= gain);
///     }
/// }
/// fn frame(obj: &mut ObjectMemory, frame: &mut [f32]) {
///     let gain = obj.float(0);
///     frame.iter_mut().for_each(|s| *s *= gain);
/// }
///
/// let mut compiler = NativeClassCompiler::new();
/// compiler.register(
///     ClassDefinition::new("Gain")
///         .with_member("gain", NativeType::Float, Value::Float(0.5))
///         .with_process(2, process)
///         .with_process_frame(2, frame),
/// );
///
/// let class = compiler.compile("struct Gain {};", "Gain", 2).unwrap();
/// assert_eq!(class.num_channels(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    id: String,
    members: Vec<(String, TypeInfo, Option<Initialiser>)>,
    callbacks: Vec<(CallbackId, FunctionData)>,
    parameters: Vec<ParameterDefinition>,
    external_data: Option<FunctionData>,
    data_slots: [usize; 4],
    functions: Vec<FunctionData>,
    requirements: NodeRequirements,
}

impl ClassDefinition {
    /// An empty class.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: Vec::new(),
            callbacks: Vec::new(),
            parameters: Vec::new(),
            external_data: None,
            data_slots: [0; 4],
            functions: Vec::new(),
            requirements: NodeRequirements {
                monophonic_only: true,
                ..NodeRequirements::default()
            },
        }
    }

    /// Class id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declares a scalar member with an initial value.
    pub fn with_member(mut self, id: &str, t: impl Into<TypeInfo>, default: Value) -> Self {
        self.members
            .push((id.to_string(), t.into(), Some(Initialiser::Value(default))));
        self
    }

    /// Declares a member without initial value.
    pub fn with_typed_member(mut self, id: &str, t: TypeInfo) -> Self {
        self.members.push((id.to_string(), t, None));
        self
    }

    /// Adds a callback with an explicit signature.
    ///
    /// The signature is checked when the class is built.
    pub fn with_callback(mut self, id: CallbackId, function: FunctionData) -> Self {
        self.callbacks.retain(|(c, _)| *c != id);
        self.callbacks.push((id, function));
        self
    }

    fn callback_data(&self, id: CallbackId, args: Vec<TypeInfo>, f: FunctionPointer) -> FunctionData {
        let mut data = FunctionData::new(
            format!("{}::{}", self.id, id.name()).as_str(),
            NativeType::Void,
        )
        .with_function(f);
        for t in args {
            data = data.with_arg("arg", t);
        }
        data
    }

    fn with_typed_callback(
        self,
        id: CallbackId,
        args: Result<Vec<TypeInfo>, TypeError>,
        f: FunctionPointer,
    ) -> Self {
        // A failed helper type leaves the argument list empty; the signature
        // check at build time reports it.
        let data = self.callback_data(id, args.unwrap_or_default(), f);
        self.with_callback(id, data)
    }

    /// `void prepare(PrepareSpecs)`
    pub fn with_prepare(self, f: fn(&mut ObjectMemory, &PrepareSpecs)) -> Self {
        self.with_typed_callback(
            CallbackId::Prepare,
            CallbackId::Prepare.argument_types(0),
            FunctionPointer::Prepare(f),
        )
    }

    /// `void process(ProcessData<N>&)` for `num_channels` channels.
    pub fn with_process(self, num_channels: usize, f: fn(&mut ObjectMemory, &mut ProcessData<'_>)) -> Self {
        self.with_typed_callback(
            CallbackId::Process,
            CallbackId::Process.argument_types(num_channels),
            FunctionPointer::Process(f),
        )
    }

    /// `void processFrame(span<float, N>&)` for `num_channels` channels.
    pub fn with_process_frame(self, num_channels: usize, f: fn(&mut ObjectMemory, &mut [f32])) -> Self {
        self.with_typed_callback(
            CallbackId::ProcessFrame,
            CallbackId::ProcessFrame.argument_types(num_channels),
            FunctionPointer::ProcessFrame(f),
        )
    }

    /// `void reset()`
    pub fn with_reset(self, f: fn(&mut ObjectMemory)) -> Self {
        self.with_typed_callback(CallbackId::Reset, Ok(Vec::new()), FunctionPointer::Reset(f))
    }

    /// `void handleEvent(HiseEvent&)`
    pub fn with_handle_event(self, f: fn(&mut ObjectMemory, &mut HiseEvent)) -> Self {
        self.with_typed_callback(
            CallbackId::HandleEvent,
            CallbackId::HandleEvent.argument_types(0),
            FunctionPointer::HandleEvent(f),
        )
    }

    /// Adds a parameter setter.
    pub fn with_parameter(
        mut self,
        name: &str,
        range: ParameterRange,
        default: f64,
        f: fn(&mut ObjectMemory, f64),
    ) -> Self {
        let index = self.parameters.len();
        let function = FunctionData::new(
            format!("{}::setParameter<{index}>", self.id).as_str(),
            NativeType::Void,
        )
        .with_arg("value", NativeType::Double)
        .with_function(FunctionPointer::SetParameter(f))
        .with_description(name);
        self.parameters.push(ParameterDefinition {
            name: name.to_string(),
            range,
            default,
            function,
        });
        self
    }

    /// Adds the `setExternalData` callback and requests `count` slots of
    /// `data_type`.
    pub fn with_external_data(
        mut self,
        data_type: DataType,
        count: usize,
        f: fn(&mut ObjectMemory, &ExternalData, usize),
    ) -> Self {
        self.data_slots[data_type.index()] = count;
        self.external_data = Some(
            FunctionData::new(
                format!("{}::setExternalData", self.id).as_str(),
                NativeType::Void,
            )
            .with_arg("data", NativeType::Pointer)
            .with_arg("index", NativeType::Integer)
            .with_function(FunctionPointer::SetExternalData(f)),
        );
        self
    }

    /// Adds a member function callable as `object.id(args)`.
    pub fn with_function(
        mut self,
        id: &str,
        return_type: NativeType,
        args: &[(&str, NativeType)],
        f: fn(&mut ObjectMemory, &[Value]) -> Value,
    ) -> Self {
        let mut data = FunctionData::new(id, return_type).with_function(FunctionPointer::Member(f));
        for (name, t) in args {
            data = data.with_arg(name, *t);
        }
        self.functions.push(data);
        self
    }

    /// Only runs at `sample_rate`.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.requirements.sample_rate = Some(sample_rate);
        self
    }

    /// Only runs with blocks of `block_size` samples.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.requirements.block_size = Some(block_size);
        self
    }

    /// Must be placed below a frame-based container.
    pub fn with_frame_parent(mut self) -> Self {
        self.requirements.frame_parent = true;
        self
    }

    /// Builds the class for `num_channels` channels.
    ///
    /// On failure, returns the callback at fault (if any) with the error.
    fn try_build(&self, num_channels: usize) -> Result<CompiledClass, (Option<CallbackId>, CompileError)> {
        let object_type = StructType::new(self.id.as_str());
        for (id, t, default) in &self.members {
            object_type
                .add_member(id.as_str(), t.clone(), default.clone())
                .map_err(|e| (None, e.into()))?;
        }

        let mut functions = FunctionClass::new(self.id.as_str());
        for f in &self.functions {
            functions.add_function(f.clone().with_owner(self.id.as_str()));
        }
        object_type.set_function_class(functions);
        object_type.finalise_alignment().map_err(|e| (None, e.into()))?;

        let mut callbacks: Vec<FunctionData> = Vec::with_capacity(CallbackId::ALL.len());
        for id in CallbackId::ALL {
            let expected = id.argument_types(num_channels).map_err(|e| (Some(id), e.into()))?;
            let Some((_, f)) = self.callbacks.iter().find(|(c, _)| *c == id) else {
                if !id.is_optional() {
                    return Err((
                        Some(id),
                        CompileError::new(format!("missing callback {}", id.name())),
                    ));
                }
                let noop = match id {
                    CallbackId::Prepare => FunctionPointer::Prepare(noop_prepare),
                    CallbackId::Reset => FunctionPointer::Reset(noop_reset),
                    _ => FunctionPointer::HandleEvent(noop_event),
                };
                callbacks.push(self.callback_data(id, expected, noop));
                continue;
            };

            let void = TypeInfo::native(NativeType::Void);
            let pointer_ok = f.function.as_ref().is_some_and(|p| id.accepts(p));
            if !pointer_ok || !f.matches_signature(&void, &expected) {
                let wanted = self.callback_data(id, expected, FunctionPointer::Reset(noop_reset));
                return Err((
                    Some(id),
                    CompileError::new(format!(
                        "{} doesn't match {}",
                        f.signature(),
                        wanted.signature()
                    )),
                ));
            }
            callbacks.push(f.clone());
        }

        Ok(CompiledClass {
            id: self.id.clone(),
            object_type: Arc::new(object_type),
            num_channels,
            callbacks,
            parameters: self.parameters.clone(),
            external_data: self.external_data.clone(),
            data_slots: self.data_slots,
            requirements: self.requirements,
        })
    }

    /// Builds the class for `num_channels` channels.
    pub fn build(&self, num_channels: usize) -> CompileResult<CompiledClass> {
        self.try_build(num_channels).map_err(|(_, e)| e)
    }
}

/// A class with its finalised layout and resolved callback table.
pub struct CompiledClass {
    id: String,
    object_type: Arc<StructType>,
    num_channels: usize,
    callbacks: Vec<FunctionData>,
    parameters: Vec<ParameterDefinition>,
    external_data: Option<FunctionData>,
    data_slots: [usize; 4],
    requirements: NodeRequirements,
}

impl CompiledClass {
    /// Class id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Channel count the callbacks were resolved for.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Resolved callback.
    pub fn callback(&self, id: CallbackId) -> Option<&FunctionData> {
        self.callbacks.get(id.index())
    }

    /// Parameter setters in index order.
    pub fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    /// The `setExternalData` callback.
    pub fn external_data_callback(&self) -> Option<&FunctionData> {
        self.external_data.as_ref()
    }

    /// Number of slots of `data_type` the class uses.
    pub fn data_slots(&self, data_type: DataType) -> usize {
        self.data_slots[data_type.index()]
    }

    /// Processing context instances can run in.
    pub fn requirements(&self) -> NodeRequirements {
        self.requirements
    }

    /// Object layout.
    pub fn object_type(&self) -> &Arc<StructType> {
        &self.object_type
    }

    /// Member functions.
    pub fn functions(&self) -> Option<Arc<FunctionClass>> {
        self.object_type.function_class()
    }

    /// Allocates an instance with default member values.
    pub fn create_instance(&self) -> Result<ObjectMemory, TypeError> {
        ObjectMemory::new(Arc::clone(&self.object_type))
    }
}

impl std::fmt::Debug for CompiledClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledClass")
            .field("id", &self.id)
            .field("num_channels", &self.num_channels)
            .field("parameters", &self.parameters.len())
            .finish_non_exhaustive()
    }
}

/// Produces compiled classes from SNEX code.
pub trait SnexCompiler: Send + Sync {
    /// Compiles `class_id` from `code` for `num_channels` channels.
    fn compile(&self, code: &str, class_id: &str, num_channels: usize) -> CompileResult<Arc<CompiledClass>>;
}

/// 1-based line and column of byte offset `pos` in `code`.
fn locate(code: &str, pos: usize) -> (i32, i32) {
    let before = &code[..pos.min(code.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;
    (line as i32, column as i32)
}

fn find_word(code: &str, word: &str, from: usize) -> Option<usize> {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let mut start = from;
    while let Some(found) = code.get(start..)?.find(word) {
        let pos = start + found;
        let end = pos + word.len();
        let before_ok = code[..pos].chars().next_back().is_none_or(|c| !is_ident(c));
        let after_ok = code[end..].chars().next().is_none_or(|c| !is_ident(c));
        if before_ok && after_ok {
            return Some(pos);
        }
        start = end;
    }
    None
}

/// Resolves class ids against natively implemented classes.
///
/// The code must declare `struct <class_id>`; errors are reported at the
/// declaration or at the offending callback.
#[derive(Debug, Default, Clone)]
pub struct NativeClassCompiler {
    classes: BTreeMap<String, ClassDefinition>,
}

impl NativeClassCompiler {
    /// A compiler without classes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class, replacing one with the same id.
    pub fn register(&mut self, definition: ClassDefinition) {
        self.classes.insert(definition.id.clone(), definition);
    }

    /// Whether a class with this id is registered.
    pub fn contains(&self, class_id: &str) -> bool {
        self.classes.contains_key(class_id)
    }

    /// Registered class ids, sorted.
    pub fn class_ids(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    fn struct_location(code: &str, class_id: &str) -> Option<usize> {
        let mut from = 0;
        while let Some(pos) = find_word(code, "struct", from) {
            let rest = code[pos + "struct".len()..].trim_start();
            let name_end = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if &rest[..name_end] == class_id {
                return Some(pos);
            }
            from = pos + "struct".len();
        }
        None
    }
}

impl SnexCompiler for NativeClassCompiler {
    fn compile(&self, code: &str, class_id: &str, num_channels: usize) -> CompileResult<Arc<CompiledClass>> {
        let Some(struct_pos) = Self::struct_location(code, class_id) else {
            return Err(CompileError::at(format!("Can't find struct {class_id}"), 1, 1));
        };
        let (line, column) = locate(code, struct_pos);

        let Some(definition) = self.classes.get(class_id) else {
            return Err(CompileError::at(
                format!("Unknown class {class_id}"),
                line,
                column,
            ));
        };

        match definition.try_build(num_channels) {
            Ok(class) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(class = class_id, channels = num_channels, "compiled class");
                Ok(Arc::new(class))
            }
            Err((callback, err)) => {
                let pos = callback
                    .and_then(|c| find_word(code, c.name(), struct_pos))
                    .unwrap_or(struct_pos);
                let (line, column) = locate(code, pos);
                #[cfg(feature = "tracing")]
                tracing::warn!(class = class_id, line, column, "compile error: {}", err.message);
                Err(CompileError::at(err.message, line, column))
            }
        }
    }
}
