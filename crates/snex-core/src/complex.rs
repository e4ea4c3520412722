//! Aggregate ("complex") types with explicit memory layout.
//!
//! Layout is computed in two phases. Members are declared first, then
//! [`ComplexType::finalise_alignment`] computes offsets, size and alignment
//! exactly once. After that the type is frozen: declaring another member or
//! finalising again returns [`TypeError::AlreadyFinalised`] and the layout
//! stays what it was.
//!
//! Three kinds are provided:
//!
//! | Type | Source form | Layout |
//! |------|-------------|--------|
//! | [`StructType`] | `struct X { ... }` | members in declaration order, each aligned |
//! | [`SpanType`] | `span<T, N>` | `N` consecutive elements |
//! | [`DynType`] | `dyn<T>` | pointer + element count |
//!
//! `span<T, N>` may be cast to `dyn<T>`; every other cast is rejected unless a
//! type opts in.

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::TypeError;
use crate::function_class::FunctionClass;
use crate::types::{TypeInfo, fnv1a};
use crate::value::{NativeType, Value};

/// Which family a complex type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexKind {
    /// A struct with named members.
    Struct,
    /// A fixed-size array.
    Span,
    /// A non-owning view on an array.
    Dyn,
}

/// Visitor used by [`ComplexType::for_each`].
///
/// Receives every visited type and its byte offset inside the root object;
/// returning `true` stops the traversal.
pub type TypeVisitor<'a> = dyn FnMut(&dyn ComplexType, usize) -> bool + 'a;

/// An aggregate type with explicit memory layout.
pub trait ComplexType: Send + Sync {
    /// Type family.
    fn kind(&self) -> ComplexKind;

    /// Name used in signatures (`Gain`, `span<float, 2>`).
    fn type_name(&self) -> String;

    /// Full structural description used for type identity.
    fn canonical_string(&self) -> String {
        self.type_name()
    }

    /// Alternative name introduced by a `using` declaration.
    fn alias(&self) -> Option<&str> {
        None
    }

    /// Bytes needed for one instance.
    fn required_byte_size(&self) -> usize;

    /// Alignment of one instance.
    fn required_alignment(&self) -> usize;

    /// Computes and freezes the layout. Fails if called twice.
    fn finalise_alignment(&self) -> Result<(), TypeError>;

    /// Whether the layout is frozen.
    fn is_finalised(&self) -> bool;

    /// Element type of array-like types.
    fn element_type(&self) -> Option<TypeInfo> {
        None
    }

    /// Writes initial values into `memory`, which must hold at least
    /// `required_byte_size()` bytes.
    fn initialise(&self, memory: &mut [u8], init: &InitialiserList) -> Result<(), TypeError>;

    /// Initialiser list with every member's default value.
    fn default_initialiser(&self) -> InitialiserList;

    /// Visits this type and every complex sub-object in storage order.
    ///
    /// Returns `true` if the visitor aborted the traversal.
    fn for_each(&self, visitor: &mut TypeVisitor<'_>, offset: usize) -> bool;

    /// Appends a human-readable rendering of an instance to `out`.
    fn dump(&self, out: &mut String, indent: usize, memory: &[u8]);

    /// Member functions and operator overloads of this type.
    fn function_class(&self) -> Option<Arc<FunctionClass>> {
        None
    }

    /// Whether a value of the given source type may be cast to this type.
    fn is_valid_cast_source(&self, _native: NativeType, _source: Option<&dyn ComplexType>) -> bool {
        false
    }

    /// Whether this type may be cast to the given target type.
    fn is_valid_cast_target(&self, _native: NativeType, _target: Option<&dyn ComplexType>) -> bool {
        false
    }

    /// Identity hash of the canonical string.
    fn content_hash(&self) -> u64 {
        fnv1a(self.canonical_string().as_bytes())
    }

    /// Whether `id` names this type, directly or through its alias.
    fn matches_id(&self, id: &str) -> bool {
        self.type_name() == id || self.alias() == Some(id)
    }
}

impl fmt::Debug for dyn ComplexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComplexType({})", self.type_name())
    }
}

// ============================================================================
// Initialiser lists
// ============================================================================

/// One entry of an initialiser list.
#[derive(Debug, Clone, PartialEq)]
pub enum Initialiser {
    /// A scalar value.
    Value(Value),
    /// A nested list for a complex member.
    List(InitialiserList),
}

/// Brace-enclosed initial values, e.g. `{ 1.0f, { 2, 3 } }`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InitialiserList {
    items: Vec<Initialiser>,
}

impl InitialiserList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// A flat list of scalar values.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            items: values.into_iter().map(Initialiser::Value).collect(),
        }
    }

    /// Appends a scalar value.
    pub fn with_value(mut self, value: Value) -> Self {
        self.items.push(Initialiser::Value(value));
        self
    }

    /// Appends a nested list.
    pub fn with_list(mut self, list: InitialiserList) -> Self {
        self.items.push(Initialiser::List(list));
        self
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&Initialiser> {
        self.items.get(index)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First scalar value found depth-first.
    pub fn first_value(&self) -> Option<Value> {
        self.items.iter().find_map(|item| match item {
            Initialiser::Value(v) => Some(*v),
            Initialiser::List(l) => l.first_value(),
        })
    }

    /// Entry for element `index`; a single-entry list applies to every element.
    fn broadcast(&self, index: usize) -> Option<&Initialiser> {
        if self.items.len() == 1 {
            self.items.first()
        } else {
            self.items.get(index)
        }
    }
}

impl fmt::Display for InitialiserList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match item {
                Initialiser::Value(v) => write!(f, "{v}")?,
                Initialiser::List(l) => write!(f, "{l}")?,
            }
        }
        f.write_str(" }")
    }
}

// ============================================================================
// Raw memory access
// ============================================================================

fn round_up(value: usize, alignment: usize) -> usize {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

/// Writes a scalar at `offset`, converting it to `target` first.
///
/// `Value::Void` zero-fills the slot.
pub fn write_value(
    memory: &mut [u8],
    offset: usize,
    target: NativeType,
    value: Value,
) -> Result<(), TypeError> {
    let end = offset + target.size();
    let size = memory.len();
    let slot = memory
        .get_mut(offset..end)
        .ok_or(TypeError::OutOfBounds { offset: end, size })?;

    if matches!(value, Value::Void) {
        slot.fill(0);
        return Ok(());
    }

    match value.cast(target) {
        Some(Value::Integer(v)) => slot.copy_from_slice(&v.to_le_bytes()),
        Some(Value::Float(v)) => slot.copy_from_slice(&v.to_le_bytes()),
        Some(Value::Double(v)) => slot.copy_from_slice(&v.to_le_bytes()),
        Some(Value::Void) | None => {
            return Err(TypeError::InvalidStore {
                value: value.to_string(),
                target: target.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Reads a scalar of type `t` at `offset`.
pub fn read_value(memory: &[u8], offset: usize, t: NativeType) -> Option<Value> {
    match t {
        NativeType::Integer => {
            let bytes: [u8; 4] = memory.get(offset..offset + 4)?.try_into().ok()?;
            Some(Value::Integer(i32::from_le_bytes(bytes)))
        }
        NativeType::Float => {
            let bytes: [u8; 4] = memory.get(offset..offset + 4)?.try_into().ok()?;
            Some(Value::Float(f32::from_le_bytes(bytes)))
        }
        NativeType::Double => {
            let bytes: [u8; 8] = memory.get(offset..offset + 8)?.try_into().ok()?;
            Some(Value::Double(f64::from_le_bytes(bytes)))
        }
        _ => None,
    }
}

fn initialise_slot(
    memory: &mut [u8],
    offset: usize,
    t: &TypeInfo,
    item: Option<&Initialiser>,
) -> Result<(), TypeError> {
    if let Some(c) = t.complex_type() {
        let end = offset + c.required_byte_size();
        let size = memory.len();
        let slot = memory
            .get_mut(offset..end)
            .ok_or(TypeError::OutOfBounds { offset: end, size })?;

        return match item {
            Some(Initialiser::List(list)) => c.initialise(slot, list),
            Some(Initialiser::Value(v)) => c.initialise(slot, &InitialiserList::from_values([*v])),
            None => c.initialise(slot, &c.default_initialiser()),
        };
    }

    let value = match item {
        Some(Initialiser::Value(v)) => *v,
        Some(Initialiser::List(list)) => list.first_value().unwrap_or_default(),
        None => Value::Void,
    };
    write_value(memory, offset, t.native_type(), value)
}

fn dump_slot(out: &mut String, indent: usize, memory: &[u8], offset: usize, t: &TypeInfo, id: &str) {
    let pad = "  ".repeat(indent);
    if let Some(c) = t.complex_type() {
        out.push_str(&format!("{pad}{id}:\n"));
        c.dump(out, indent + 1, memory.get(offset..).unwrap_or_default());
    } else {
        let value = read_value(memory, offset, t.native_type())
            .map_or_else(|| "?".to_string(), |v| v.to_string());
        out.push_str(&format!("{pad}{} {id} = {value}\n", t.type_name()));
    }
}

// ============================================================================
// StructType
// ============================================================================

/// A named member of a [`StructType`].
#[derive(Debug, Clone)]
pub struct Member {
    /// Member name.
    pub id: String,
    /// Member type. Complex members are stored inline.
    pub type_info: TypeInfo,
    /// Default value used when an initialiser list omits the member.
    pub default: Option<Initialiser>,
}

#[derive(Debug, Clone)]
struct Layout {
    offsets: Vec<usize>,
    native_types: Vec<NativeType>,
    size: usize,
    alignment: usize,
}

impl Layout {
    fn compute(members: &[Member]) -> Self {
        let mut offset = 0;
        let mut alignment = 1;
        let mut offsets = Vec::with_capacity(members.len());
        let mut native_types = Vec::with_capacity(members.len());

        for m in members {
            let a = m.type_info.required_alignment().max(1);
            offset = round_up(offset, a);
            offsets.push(offset);
            native_types.push(m.type_info.native_type());
            offset += m.type_info.required_byte_size();
            alignment = alignment.max(a);
        }

        Self {
            offsets,
            native_types,
            size: round_up(offset, alignment),
            alignment,
        }
    }
}

/// A struct with named, individually aligned members.
pub struct StructType {
    id: String,
    alias: Option<String>,
    members: RwLock<Vec<Member>>,
    function_class: RwLock<Option<Arc<FunctionClass>>>,
    layout: OnceLock<Layout>,
}

impl StructType {
    /// Creates an empty struct type.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: None,
            members: RwLock::new(Vec::new()),
            function_class: RwLock::new(None),
            layout: OnceLock::new(),
        }
    }

    /// Sets an alias name.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Struct name.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declares a member. Fails once the layout is finalised.
    pub fn add_member(
        &self,
        id: impl Into<String>,
        type_info: TypeInfo,
        default: Option<Initialiser>,
    ) -> Result<(), TypeError> {
        if self.is_finalised() {
            return Err(TypeError::AlreadyFinalised(self.id.clone()));
        }

        let id = id.into();
        let mut members = self.members.write();

        if self.is_finalised() {
            return Err(TypeError::AlreadyFinalised(self.id.clone()));
        }
        if members.iter().any(|m| m.id == id) {
            return Err(TypeError::DuplicateMember {
                type_name: self.id.clone(),
                member: id,
            });
        }

        members.push(Member {
            id,
            type_info,
            default,
        });
        Ok(())
    }

    /// Attaches member functions.
    pub fn set_function_class(&self, functions: FunctionClass) {
        *self.function_class.write() = Some(Arc::new(functions));
    }

    /// Number of declared members.
    pub fn num_members(&self) -> usize {
        self.members.read().len()
    }

    /// Index of the member called `id`.
    pub fn member_index(&self, id: &str) -> Option<usize> {
        self.members.read().iter().position(|m| m.id == id)
    }

    /// Copy of the member declaration at `index`.
    pub fn member(&self, index: usize) -> Option<Member> {
        self.members.read().get(index).cloned()
    }

    /// Byte offset of a member. `None` before finalisation.
    pub fn member_offset(&self, index: usize) -> Option<usize> {
        self.layout.get()?.offsets.get(index).copied()
    }

    /// Offset and native kind of a member, without locking.
    pub fn member_slot(&self, index: usize) -> Option<(usize, NativeType)> {
        let layout = self.layout.get()?;
        Some((*layout.offsets.get(index)?, *layout.native_types.get(index)?))
    }

    fn current_layout(&self) -> Layout {
        match self.layout.get() {
            Some(layout) => layout.clone(),
            None => Layout::compute(&self.members.read()),
        }
    }
}

impl ComplexType for StructType {
    fn kind(&self) -> ComplexKind {
        ComplexKind::Struct
    }

    fn type_name(&self) -> String {
        self.id.clone()
    }

    fn canonical_string(&self) -> String {
        let mut s = format!("struct {} {{ ", self.id);
        for m in self.members.read().iter() {
            let t = m
                .type_info
                .complex_type()
                .map_or_else(|| m.type_info.type_name(), |c| c.canonical_string());
            s.push_str(&format!("{t} {}; ", m.id));
        }
        s.push('}');
        s
    }

    fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    fn required_byte_size(&self) -> usize {
        self.layout
            .get()
            .map_or_else(|| self.current_layout().size, |l| l.size)
    }

    fn required_alignment(&self) -> usize {
        self.layout
            .get()
            .map_or_else(|| self.current_layout().alignment, |l| l.alignment)
    }

    fn finalise_alignment(&self) -> Result<(), TypeError> {
        if self.is_finalised() {
            return Err(TypeError::AlreadyFinalised(self.id.clone()));
        }

        let members = self.members.read();
        for m in members.iter() {
            if let Some(c) = m.type_info.complex_type()
                && !c.is_finalised()
            {
                c.finalise_alignment()?;
            }
        }

        self.layout
            .set(Layout::compute(&members))
            .map_err(|_| TypeError::AlreadyFinalised(self.id.clone()))
    }

    fn is_finalised(&self) -> bool {
        self.layout.get().is_some()
    }

    fn initialise(&self, memory: &mut [u8], init: &InitialiserList) -> Result<(), TypeError> {
        let layout = self
            .layout
            .get()
            .ok_or_else(|| TypeError::NotFinalised(self.id.clone()))?;

        if memory.len() < layout.size {
            return Err(TypeError::OutOfBounds {
                offset: layout.size,
                size: memory.len(),
            });
        }

        let members = self.members.read();
        for (i, m) in members.iter().enumerate() {
            let item = init.get(i).or(m.default.as_ref());
            initialise_slot(memory, layout.offsets[i], &m.type_info, item)?;
        }
        Ok(())
    }

    fn default_initialiser(&self) -> InitialiserList {
        let mut list = InitialiserList::new();
        for m in self.members.read().iter() {
            list = match (&m.default, m.type_info.complex_type()) {
                (Some(Initialiser::Value(v)), _) => list.with_value(*v),
                (Some(Initialiser::List(l)), _) => list.with_list(l.clone()),
                (None, Some(c)) => list.with_list(c.default_initialiser()),
                (None, None) => list.with_value(Value::Void),
            };
        }
        list
    }

    fn for_each(&self, visitor: &mut TypeVisitor<'_>, offset: usize) -> bool {
        if visitor(self as &dyn ComplexType, offset) {
            return true;
        }

        let Some(layout) = self.layout.get() else {
            return false;
        };

        let members = self.members.read();
        for (i, m) in members.iter().enumerate() {
            if let Some(c) = m.type_info.complex_type()
                && c.for_each(visitor, offset + layout.offsets[i])
            {
                return true;
            }
        }
        false
    }

    fn dump(&self, out: &mut String, indent: usize, memory: &[u8]) {
        let pad = "  ".repeat(indent);
        out.push_str(&format!("{pad}{} {{\n", self.id));

        if let Some(layout) = self.layout.get() {
            for (i, m) in self.members.read().iter().enumerate() {
                dump_slot(out, indent + 1, memory, layout.offsets[i], &m.type_info, &m.id);
            }
        }

        out.push_str(&format!("{pad}}}\n"));
    }

    fn function_class(&self) -> Option<Arc<FunctionClass>> {
        self.function_class.read().clone()
    }
}

// ============================================================================
// SpanType
// ============================================================================

/// A fixed-size array `span<T, N>`.
pub struct SpanType {
    element: TypeInfo,
    count: usize,
    finalised: OnceLock<()>,
}

impl SpanType {
    /// Creates `span<element, count>`.
    pub fn new(element: TypeInfo, count: usize) -> Self {
        Self {
            element,
            count,
            finalised: OnceLock::new(),
        }
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.count
    }

    fn stride(&self) -> usize {
        round_up(
            self.element.required_byte_size(),
            self.element.required_alignment(),
        )
    }
}

impl ComplexType for SpanType {
    fn kind(&self) -> ComplexKind {
        ComplexKind::Span
    }

    fn type_name(&self) -> String {
        format!("span<{}, {}>", self.element.type_name(), self.count)
    }

    fn canonical_string(&self) -> String {
        let element = self
            .element
            .complex_type()
            .map_or_else(|| self.element.type_name(), |c| c.canonical_string());
        format!("span<{element}, {}>", self.count)
    }

    fn required_byte_size(&self) -> usize {
        self.stride() * self.count
    }

    fn required_alignment(&self) -> usize {
        self.element.required_alignment().max(1)
    }

    fn finalise_alignment(&self) -> Result<(), TypeError> {
        if self.is_finalised() {
            return Err(TypeError::AlreadyFinalised(self.type_name()));
        }
        if let Some(c) = self.element.complex_type()
            && !c.is_finalised()
        {
            c.finalise_alignment()?;
        }
        self.finalised
            .set(())
            .map_err(|()| TypeError::AlreadyFinalised(self.type_name()))
    }

    fn is_finalised(&self) -> bool {
        self.finalised.get().is_some()
    }

    fn element_type(&self) -> Option<TypeInfo> {
        Some(self.element.clone())
    }

    fn initialise(&self, memory: &mut [u8], init: &InitialiserList) -> Result<(), TypeError> {
        if !self.is_finalised() {
            return Err(TypeError::NotFinalised(self.type_name()));
        }

        let stride = self.stride();
        for i in 0..self.count {
            initialise_slot(memory, i * stride, &self.element, init.broadcast(i))?;
        }
        Ok(())
    }

    fn default_initialiser(&self) -> InitialiserList {
        match self.element.complex_type() {
            Some(c) => InitialiserList::new().with_list(c.default_initialiser()),
            None => InitialiserList::new().with_value(Value::Void),
        }
    }

    fn for_each(&self, visitor: &mut TypeVisitor<'_>, offset: usize) -> bool {
        if visitor(self as &dyn ComplexType, offset) {
            return true;
        }

        if let Some(c) = self.element.complex_type() {
            let stride = self.stride();
            for i in 0..self.count {
                if c.for_each(visitor, offset + i * stride) {
                    return true;
                }
            }
        }
        false
    }

    fn dump(&self, out: &mut String, indent: usize, memory: &[u8]) {
        let pad = "  ".repeat(indent);
        out.push_str(&format!("{pad}{} [\n", self.type_name()));
        let stride = self.stride();
        for i in 0..self.count {
            dump_slot(out, indent + 1, memory, i * stride, &self.element, &format!("[{i}]"));
        }
        out.push_str(&format!("{pad}]\n"));
    }

    fn is_valid_cast_target(&self, _native: NativeType, target: Option<&dyn ComplexType>) -> bool {
        target.is_some_and(|t| {
            t.kind() == ComplexKind::Dyn && t.element_type().as_ref() == Some(&self.element)
        })
    }
}

// ============================================================================
// DynType
// ============================================================================

/// A non-owning view `dyn<T>` (data pointer + element count).
pub struct DynType {
    element: TypeInfo,
    finalised: OnceLock<()>,
}

impl DynType {
    /// Creates `dyn<element>`.
    pub fn new(element: TypeInfo) -> Self {
        Self {
            element,
            finalised: OnceLock::new(),
        }
    }
}

impl ComplexType for DynType {
    fn kind(&self) -> ComplexKind {
        ComplexKind::Dyn
    }

    fn type_name(&self) -> String {
        format!("dyn<{}>", self.element.type_name())
    }

    fn required_byte_size(&self) -> usize {
        16
    }

    fn required_alignment(&self) -> usize {
        8
    }

    fn finalise_alignment(&self) -> Result<(), TypeError> {
        self.finalised
            .set(())
            .map_err(|()| TypeError::AlreadyFinalised(self.type_name()))
    }

    fn is_finalised(&self) -> bool {
        self.finalised.get().is_some()
    }

    fn element_type(&self) -> Option<TypeInfo> {
        Some(self.element.clone())
    }

    fn initialise(&self, memory: &mut [u8], _init: &InitialiserList) -> Result<(), TypeError> {
        let size = memory.len();
        memory
            .get_mut(..16)
            .ok_or(TypeError::OutOfBounds { offset: 16, size })?
            .fill(0);
        Ok(())
    }

    fn default_initialiser(&self) -> InitialiserList {
        InitialiserList::new()
    }

    fn for_each(&self, visitor: &mut TypeVisitor<'_>, offset: usize) -> bool {
        visitor(self as &dyn ComplexType, offset)
    }

    fn dump(&self, out: &mut String, indent: usize, _memory: &[u8]) {
        out.push_str(&format!("{}{} (view)\n", "  ".repeat(indent), self.type_name()));
    }

    fn is_valid_cast_source(&self, _native: NativeType, source: Option<&dyn ComplexType>) -> bool {
        source.is_some_and(|s| {
            matches!(s.kind(), ComplexKind::Span | ComplexKind::Dyn)
                && s.element_type().as_ref() == Some(&self.element)
        })
    }
}
