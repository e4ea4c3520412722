//! Callable operations: [`FunctionData`] and its [`Inliner`].
//!
//! A function is resolved when it either points at native code
//! ([`FunctionPointer`]) or carries an inliner. Resolution by argument types
//! is exact; see [`FunctionData::matches_argument_types`].

use std::fmt;
use std::sync::Arc;

use crate::compiler::CompileError;
use crate::error::TypeError;
use crate::event::HiseEvent;
use crate::external_data::ExternalData;
use crate::inline::InlineData;
use crate::object::ObjectMemory;
use crate::process::ProcessData;
use crate::specs::PrepareSpecs;
use crate::symbol::Symbol;
use crate::types::TypeInfo;
use crate::value::Value;

/// Native entry point of a function.
///
/// Each variant is a plain `fn` pointer with the ABI of one call kind, so
/// invoking it is a direct call with no allocation.
#[derive(Clone, Copy)]
pub enum FunctionPointer {
    /// Free function on scalar arguments.
    Free(fn(&[Value]) -> Value),
    /// Member function on an object instance.
    Member(fn(&mut ObjectMemory, &[Value]) -> Value),
    /// `void prepare(PrepareSpecs)`
    Prepare(fn(&mut ObjectMemory, &PrepareSpecs)),
    /// `void process(ProcessData<N>&)`
    Process(fn(&mut ObjectMemory, &mut ProcessData<'_>)),
    /// `void processFrame(span<float, N>&)`
    ProcessFrame(fn(&mut ObjectMemory, &mut [f32])),
    /// `void reset()`
    Reset(fn(&mut ObjectMemory)),
    /// `void handleEvent(HiseEvent&)`
    HandleEvent(fn(&mut ObjectMemory, &mut HiseEvent)),
    /// `void setParameter<P>(double)`
    SetParameter(fn(&mut ObjectMemory, f64)),
    /// `void setExternalData(const ExternalData&, int)`
    SetExternalData(fn(&mut ObjectMemory, &ExternalData, usize)),
}

impl fmt::Debug for FunctionPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            FunctionPointer::Free(_) => "Free",
            FunctionPointer::Member(_) => "Member",
            FunctionPointer::Prepare(_) => "Prepare",
            FunctionPointer::Process(_) => "Process",
            FunctionPointer::ProcessFrame(_) => "ProcessFrame",
            FunctionPointer::Reset(_) => "Reset",
            FunctionPointer::HandleEvent(_) => "HandleEvent",
            FunctionPointer::SetParameter(_) => "SetParameter",
            FunctionPointer::SetExternalData(_) => "SetExternalData",
        };
        write!(f, "FunctionPointer::{kind}")
    }
}

/// An inline code generation strategy.
pub type InlineFunction = Arc<dyn Fn(&mut InlineData) -> Result<(), CompileError> + Send + Sync>;

/// Replaces a call with inline code.
///
/// The two strategies are independent: a function may be inlineable on the
/// syntax tree, after lowering, or both.
pub struct Inliner {
    /// Function this inliner belongs to.
    pub function_id: Symbol,
    asm: Option<InlineFunction>,
    high_level: Option<InlineFunction>,
}

impl Inliner {
    /// An inliner without strategies.
    pub fn new(function_id: Symbol) -> Self {
        Self {
            function_id,
            asm: None,
            high_level: None,
        }
    }

    /// Adds the assembly strategy.
    pub fn with_asm<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut InlineData) -> Result<(), CompileError> + Send + Sync + 'static,
    {
        self.asm = Some(Arc::new(f));
        self
    }

    /// Adds the syntax tree strategy.
    pub fn with_high_level<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut InlineData) -> Result<(), CompileError> + Send + Sync + 'static,
    {
        self.high_level = Some(Arc::new(f));
        self
    }

    /// Whether the requested strategy exists.
    pub fn can_inline(&self, high_level: bool) -> bool {
        if high_level {
            self.high_level.is_some()
        } else {
            self.asm.is_some()
        }
    }

    /// Runs the strategy selected by the data variant.
    pub fn process(&self, data: &mut InlineData) -> Result<(), CompileError> {
        let strategy = if data.is_high_level() {
            &self.high_level
        } else {
            &self.asm
        };

        match strategy {
            Some(f) => f(data),
            None => Err(CompileError::new(format!(
                "{} has no {} inliner",
                self.function_id,
                if data.is_high_level() { "high level" } else { "asm" }
            ))),
        }
    }
}

impl fmt::Debug for Inliner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inliner")
            .field("function_id", &self.function_id)
            .field("asm", &self.asm.is_some())
            .field("high_level", &self.high_level.is_some())
            .finish()
    }
}

/// A callable: identity, signature and implementation.
#[derive(Clone, Default)]
pub struct FunctionData {
    /// Qualified id, e.g. `Math::abs`.
    pub id: Symbol,
    /// Owning object id for member functions, `None` for free functions.
    pub owner: Option<String>,
    /// Return type.
    pub return_type: TypeInfo,
    /// Ordered arguments.
    pub args: Vec<Symbol>,
    /// Native entry point.
    pub function: Option<FunctionPointer>,
    /// Inline strategies.
    pub inliner: Option<Arc<Inliner>>,
    /// Documentation shown by tooling.
    pub description: String,
}

impl FunctionData {
    /// An unresolved function with the given id and return type.
    pub fn new(id: impl Into<Symbol>, return_type: impl Into<TypeInfo>) -> Self {
        Self {
            id: id.into(),
            return_type: return_type.into(),
            ..Self::default()
        }
    }

    /// Appends an argument.
    pub fn with_arg(mut self, name: &str, type_info: impl Into<TypeInfo>) -> Self {
        self.args.push(Symbol::new(name).with_type(type_info.into()));
        self
    }

    /// Sets the native entry point.
    pub fn with_function(mut self, function: FunctionPointer) -> Self {
        self.function = Some(function);
        self
    }

    /// Sets the inliner.
    pub fn with_inliner(mut self, inliner: Inliner) -> Self {
        self.inliner = Some(Arc::new(inliner));
        self
    }

    /// Sets the owning object.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether the function may be called or inlined.
    pub fn is_resolved(&self) -> bool {
        self.function.is_some() || self.inliner.is_some()
    }

    /// Whether the requested inline strategy exists.
    pub fn can_be_inlined(&self, high_level: bool) -> bool {
        self.inliner
            .as_ref()
            .is_some_and(|i| i.can_inline(high_level))
    }

    /// Inlines the call. Fails if the strategy selected by `data` is missing.
    pub fn inline_function(&self, data: &mut InlineData) -> Result<(), CompileError> {
        match &self.inliner {
            Some(inliner) if inliner.can_inline(data.is_high_level()) => inliner.process(data),
            _ => Err(CompileError::new(format!(
                "can't inline {}",
                self.signature()
            ))),
        }
    }

    /// Argument types in order.
    pub fn arg_types(&self) -> Vec<TypeInfo> {
        self.args.iter().map(|a| a.type_info().clone()).collect()
    }

    /// Exact ordered match of argument types.
    pub fn matches_argument_types(&self, types: &[TypeInfo]) -> bool {
        self.args.len() == types.len()
            && self
                .args
                .iter()
                .zip(types)
                .all(|(a, t)| a.type_info() == t)
    }

    /// Exact match of return and argument types.
    pub fn matches_signature(&self, return_type: &TypeInfo, args: &[TypeInfo]) -> bool {
        &self.return_type == return_type && self.matches_argument_types(args)
    }

    /// `float Math::abs(float value)`
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                if a.id().is_empty() {
                    a.type_info().to_string()
                } else {
                    format!("{} {}", a.type_info(), a.id())
                }
            })
            .collect();
        format!("{} {}({})", self.return_type, self.id, args.join(", "))
    }

    /// Calls a free function.
    pub fn call(&self, args: &[Value]) -> Result<Value, TypeError> {
        debug_assert!(self.is_resolved(), "calling unresolved {}", self.signature());
        self.check_arg_count(args)?;
        match self.function {
            Some(FunctionPointer::Free(f)) => Ok(f(args)),
            Some(_) => Err(TypeError::InvalidCall(self.signature())),
            None => Err(TypeError::UnresolvedFunction(self.signature())),
        }
    }

    /// Calls a member function on `object`.
    pub fn call_member(&self, object: &mut ObjectMemory, args: &[Value]) -> Result<Value, TypeError> {
        debug_assert!(self.is_resolved(), "calling unresolved {}", self.signature());
        self.check_arg_count(args)?;
        match self.function {
            Some(FunctionPointer::Member(f)) => Ok(f(object, args)),
            Some(_) => Err(TypeError::InvalidCall(self.signature())),
            None => Err(TypeError::UnresolvedFunction(self.signature())),
        }
    }

    fn check_arg_count(&self, args: &[Value]) -> Result<(), TypeError> {
        if args.len() == self.args.len() {
            Ok(())
        } else {
            Err(TypeError::WrongArgumentCount {
                expected: self.args.len(),
                actual: args.len(),
            })
        }
    }
}

impl fmt::Debug for FunctionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionData")
            .field("signature", &self.signature())
            .field("owner", &self.owner)
            .field("function", &self.function)
            .field("inliner", &self.inliner)
            .finish()
    }
}
