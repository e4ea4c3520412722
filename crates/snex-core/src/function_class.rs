//! Named collections of functions, nested classes and constants.
//!
//! A [`FunctionClass`] is the lookup scope for calls like `Math::abs(x)` or
//! `obj.process(d)`. It is built once, then shared read-only (`Arc`).

use std::sync::Arc;

use serde::Serialize;

use crate::error::ResolveError;
use crate::function::{FunctionData, Inliner};
use crate::symbol::Symbol;
use crate::types::TypeInfo;
use crate::value::{NativeType, Value};

/// Operator overloads and casts with a reserved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialSymbol {
    /// `operator=`
    AssignOverload,
    /// `type_cast`
    NativeTypeCast,
    /// `operator[]`
    Subscript,
}

impl SpecialSymbol {
    /// Reserved function name.
    pub const fn id(self) -> &'static str {
        match self {
            SpecialSymbol::AssignOverload => "operator=",
            SpecialSymbol::NativeTypeCast => "type_cast",
            SpecialSymbol::Subscript => "operator[]",
        }
    }
}

/// Functions, nested classes and constants under one scope symbol.
#[derive(Debug, Clone, Default)]
pub struct FunctionClass {
    class_symbol: Symbol,
    functions: Vec<FunctionData>,
    children: Vec<Arc<FunctionClass>>,
    constants: Vec<Symbol>,
    description: String,
}

impl FunctionClass {
    /// An empty class for scope `class_symbol`.
    pub fn new(class_symbol: impl Into<Symbol>) -> Self {
        Self {
            class_symbol: class_symbol.into(),
            ..Self::default()
        }
    }

    /// Sets the description shown in the API tree.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Scope symbol.
    pub fn class_symbol(&self) -> &Symbol {
        &self.class_symbol
    }

    /// Qualified id of a function in this class.
    pub fn qualify(&self, id: &str) -> Symbol {
        self.class_symbol.child(id)
    }

    /// Adds a function. Ids not already inside this scope are moved into it.
    pub fn add_function(&mut self, mut function: FunctionData) {
        if !self.class_symbol.is_parent_of(&function.id) {
            let qualified = self.qualify(function.id.id());
            function.id = qualified.with_type(function.id.type_info().clone());
        }
        self.functions.push(function);
    }

    /// Adds a nested class.
    pub fn add_sub_function_class(&mut self, class: FunctionClass) {
        self.children.push(Arc::new(class));
    }

    /// Nested class with scope `symbol`, searched recursively.
    pub fn sub_function_class(&self, symbol: &Symbol) -> Option<Arc<FunctionClass>> {
        self.children.iter().find_map(|c| {
            if &c.class_symbol == symbol {
                Some(Arc::clone(c))
            } else {
                c.sub_function_class(symbol)
            }
        })
    }

    /// All functions declared directly in this class.
    pub fn functions(&self) -> &[FunctionData] {
        &self.functions
    }

    /// Whether a function with this id exists here or in a nested class.
    pub fn has_function(&self, symbol: &Symbol) -> bool {
        self.functions.iter().any(|f| &f.id == symbol)
            || self.children.iter().any(|c| c.has_function(symbol))
    }

    /// Distinct function ids of this class, in registration order.
    pub fn function_ids(&self) -> Vec<Symbol> {
        let mut ids: Vec<Symbol> = Vec::new();
        for f in &self.functions {
            if !ids.contains(&f.id) {
                ids.push(f.id.clone());
            }
        }
        ids
    }

    /// Registers a named constant. Replaces an existing one.
    pub fn add_function_constant(&mut self, id: &str, value: Value) {
        let symbol = self.qualify(id).with_constant(value);
        self.constants.retain(|c| c != &symbol);
        self.constants.push(symbol);
    }

    /// Whether a constant with this id exists here or in a nested class.
    pub fn has_constant(&self, symbol: &Symbol) -> bool {
        self.constant_value(symbol).is_some()
    }

    /// Value of a constant.
    pub fn constant_value(&self, symbol: &Symbol) -> Option<Value> {
        self.constants
            .iter()
            .find(|c| *c == symbol)
            .and_then(Symbol::constant)
            .or_else(|| self.children.iter().find_map(|c| c.constant_value(symbol)))
    }

    /// Collects every overload of `symbol` from this class and its nested
    /// classes.
    ///
    /// The result is sorted by signature, so it does not depend on the order
    /// in which functions were registered.
    pub fn add_matching_functions(&self, matches: &mut Vec<FunctionData>, symbol: &Symbol) {
        let start = matches.len();
        self.collect_matching(matches, symbol);
        matches[start..].sort_by_cached_key(FunctionData::signature);
    }

    fn collect_matching(&self, matches: &mut Vec<FunctionData>, symbol: &Symbol) {
        matches.extend(self.functions.iter().filter(|f| &f.id == symbol).cloned());
        for c in &self.children {
            c.collect_matching(matches, symbol);
        }
    }

    /// Picks the single overload of `symbol` that accepts `args`.
    ///
    /// Exact matches win. Without one, an overload is accepted if every
    /// argument either matches or has a registered cast into the parameter
    /// type. More than one candidate at the same level is ambiguous.
    pub fn resolve(&self, symbol: &Symbol, args: &[TypeInfo]) -> Result<FunctionData, ResolveError> {
        let mut candidates = Vec::new();
        self.add_matching_functions(&mut candidates, symbol);

        if candidates.is_empty() {
            return Err(ResolveError::NotFound(symbol.qualified_name()));
        }

        let exact: Vec<&FunctionData> = candidates
            .iter()
            .filter(|f| f.matches_argument_types(args))
            .collect();

        let chosen = if exact.is_empty() {
            candidates
                .iter()
                .filter(|f| {
                    f.args.len() == args.len()
                        && f.args
                            .iter()
                            .zip(args)
                            .all(|(param, arg)| is_castable(arg, param.type_info()))
                })
                .collect()
        } else {
            exact
        };

        match chosen.as_slice() {
            [single] => Ok((*single).clone()),
            [] => Err(ResolveError::NoMatch {
                symbol: symbol.qualified_name(),
                args: args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
            many => Err(ResolveError::Ambiguous {
                symbol: symbol.qualified_name(),
                candidates: many.len(),
            }),
        }
    }

    /// Whether any overload of `symbol` has an inliner.
    pub fn is_inlineable(&self, symbol: &Symbol) -> bool {
        self.inliner(symbol).is_some()
    }

    /// Inliner of the first overload of `symbol` that has one.
    pub fn inliner(&self, symbol: &Symbol) -> Option<Arc<Inliner>> {
        self.functions
            .iter()
            .filter(|f| &f.id == symbol)
            .find_map(|f| f.inliner.clone())
            .or_else(|| self.children.iter().find_map(|c| c.inliner(symbol)))
    }

    /// Attaches `inliner` to every overload of `symbol` that has none yet.
    ///
    /// Returns `false` if nothing was changed.
    pub fn add_inliner(&mut self, symbol: &Symbol, inliner: Inliner) -> bool {
        let inliner = Arc::new(inliner);
        let mut added = false;
        for f in self
            .functions
            .iter_mut()
            .filter(|f| &f.id == symbol && f.inliner.is_none())
        {
            f.inliner = Some(Arc::clone(&inliner));
            added = true;
        }
        added
    }

    /// An unresolved function named after a special symbol.
    pub fn create_special_function(&self, special: SpecialSymbol) -> FunctionData {
        FunctionData::new(self.qualify(special.id()), NativeType::Void)
    }

    /// Registered special function whose arguments match exactly.
    ///
    /// `return_type` is only compared if it is not dynamic.
    pub fn special_function(
        &self,
        special: SpecialSymbol,
        return_type: &TypeInfo,
        args: &[TypeInfo],
    ) -> Option<FunctionData> {
        let id = self.qualify(special.id());
        self.functions
            .iter()
            .find(|f| {
                f.id == id
                    && f.matches_argument_types(args)
                    && (return_type.is_dynamic() || &f.return_type == return_type)
            })
            .cloned()
    }

    /// Copies the native pointer of the matching registration into `f`.
    ///
    /// Returns `false` if no registration with the same id and signature has
    /// a pointer.
    pub fn fill_jit_function_pointer(&self, f: &mut FunctionData) -> bool {
        let found = self.functions.iter().find(|r| {
            r.id == f.id
                && r.function.is_some()
                && r.matches_signature(&f.return_type, &f.arg_types())
        });

        if let Some(r) = found {
            f.function = r.function;
            return true;
        }
        self.children
            .iter()
            .any(|c| c.fill_jit_function_pointer(f))
    }

    /// Stores the pointer of `f` in the matching registration.
    pub fn inject_function_pointer(&mut self, f: &FunctionData) -> bool {
        let Some(pointer) = f.function else {
            return false;
        };

        match self
            .functions
            .iter_mut()
            .find(|r| r.id == f.id && r.matches_signature(&f.return_type, &f.arg_types()))
        {
            Some(r) => {
                r.function = Some(pointer);
                true
            }
            None => false,
        }
    }

    /// Copies of all functions bound to an object instance.
    ///
    /// The copies are owned by `object_id` and are called as `object.fn()`.
    pub fn bind_to_object(&self, object_id: &str) -> Vec<FunctionData> {
        self.functions
            .iter()
            .map(|f| f.clone().with_owner(object_id))
            .collect()
    }

    /// Call expression used for a bound member function (`obj.process`).
    pub fn object_call_name(f: &FunctionData) -> String {
        match &f.owner {
            Some(owner) => format!("{owner}.{}", f.id.id()),
            None => f.id.qualified_name(),
        }
    }

    /// Tree of this class for tooling.
    pub fn api_tree(&self) -> ApiClass {
        ApiClass {
            name: self.class_symbol.qualified_name(),
            description: self.description.clone(),
            functions: self
                .functions
                .iter()
                .map(|f| ApiFunction {
                    name: f.id.id().to_string(),
                    return_type: f.return_type.to_string(),
                    arguments: f
                        .args
                        .iter()
                        .map(|a| ApiArgument {
                            name: a.id().to_string(),
                            type_name: a.type_info().to_string(),
                        })
                        .collect(),
                    description: f.description.clone(),
                })
                .collect(),
            constants: self
                .constants
                .iter()
                .map(|c| ApiConstant {
                    name: c.id().to_string(),
                    value: c.constant().unwrap_or_default().to_string(),
                })
                .collect(),
            classes: self.children.iter().map(|c| c.api_tree()).collect(),
        }
    }
}

/// Whether a value of type `from` may be passed where `to` is expected.
fn is_castable(from: &TypeInfo, to: &TypeInfo) -> bool {
    if from == to {
        return true;
    }

    let Some(target) = to.complex_type() else {
        return false;
    };

    let source = from.complex_type().map(|c| &**c);
    if target.is_valid_cast_source(from.native_type(), source)
        || source.is_some_and(|s| s.is_valid_cast_target(to.native_type(), Some(&**target)))
    {
        return true;
    }

    target.function_class().is_some_and(|fc| {
        fc.special_function(
            SpecialSymbol::NativeTypeCast,
            &TypeInfo::dynamic(),
            std::slice::from_ref(from),
        )
        .is_some()
    })
}

/// A class node of the API tree.
#[derive(Debug, Clone, Serialize)]
pub struct ApiClass {
    /// Qualified class name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Functions in registration order.
    pub functions: Vec<ApiFunction>,
    /// Constants.
    pub constants: Vec<ApiConstant>,
    /// Nested classes.
    pub classes: Vec<ApiClass>,
}

/// A function entry of the API tree.
#[derive(Debug, Clone, Serialize)]
pub struct ApiFunction {
    /// Unqualified name.
    pub name: String,
    /// Rendered return type.
    pub return_type: String,
    /// Arguments.
    pub arguments: Vec<ApiArgument>,
    /// Description.
    pub description: String,
}

/// An argument entry of the API tree.
#[derive(Debug, Clone, Serialize)]
pub struct ApiArgument {
    /// Argument name.
    pub name: String,
    /// Rendered type.
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A constant entry of the API tree.
#[derive(Debug, Clone, Serialize)]
pub struct ApiConstant {
    /// Unqualified name.
    pub name: String,
    /// Rendered value.
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::{ComplexType, DynType, SpanType, StructType};
    use crate::function::FunctionPointer;
    use crate::types::ComplexTypePtr;

    fn ret_first(args: &[Value]) -> Value {
        args[0]
    }

    fn overload(t: NativeType) -> FunctionData {
        FunctionData::new("f", t)
            .with_arg("x", t)
            .with_function(FunctionPointer::Free(ret_first))
    }

    #[test]
    fn float_argument_does_not_pick_int_or_double() {
        let mut c = FunctionClass::new("T");
        c.add_function(overload(NativeType::Integer));
        c.add_function(overload(NativeType::Double));

        let err = c
            .resolve(&Symbol::parse("T::f"), &[NativeType::Float.into()])
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoMatch { .. }));
        assert_eq!(err.to_string(), "no matching overload for T::f(float)");
    }

    #[test]
    fn exact_match_is_resolved() {
        let mut c = FunctionClass::new("T");
        c.add_function(overload(NativeType::Integer));
        c.add_function(overload(NativeType::Double));

        let f = c
            .resolve(&Symbol::parse("T::f"), &[NativeType::Double.into()])
            .unwrap();
        assert_eq!(f.return_type, TypeInfo::native(NativeType::Double));
    }

    #[test]
    fn duplicate_registration_is_ambiguous() {
        let mut c = FunctionClass::new("T");
        c.add_function(overload(NativeType::Float));
        c.add_function(overload(NativeType::Float));

        assert!(matches!(
            c.resolve(&Symbol::parse("T::f"), &[NativeType::Float.into()]),
            Err(ResolveError::Ambiguous { candidates: 2, .. })
        ));
    }

    #[test]
    fn unknown_symbol_is_not_found() {
        let c = FunctionClass::new("T");
        assert!(matches!(
            c.resolve(&Symbol::parse("T::g"), &[]),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn matching_functions_include_nested_classes_in_stable_order() {
        let build = |reverse: bool| {
            let mut outer = FunctionClass::new("A");
            let mut inner = FunctionClass::new(Symbol::parse("A::B"));
            let mut fs = vec![overload(NativeType::Float), overload(NativeType::Double)];
            if reverse {
                fs.reverse();
            }
            for f in fs {
                inner.add_function(f);
            }
            outer.add_sub_function_class(inner);
            let mut matches = Vec::new();
            outer.add_matching_functions(&mut matches, &Symbol::parse("A::B::f"));
            matches.iter().map(FunctionData::signature).collect::<Vec<_>>()
        };

        assert_eq!(build(false).len(), 2);
        assert_eq!(build(false), build(true));
    }

    #[test]
    fn span_argument_casts_to_dyn_parameter() {
        let span: ComplexTypePtr = Arc::new(SpanType::new(NativeType::Float.into(), 4));
        let dyn_float: ComplexTypePtr = Arc::new(DynType::new(NativeType::Float.into()));

        let mut c = FunctionClass::new("T");
        c.add_function(
            FunctionData::new("sum", NativeType::Float).with_arg("d", TypeInfo::complex(dyn_float)),
        );

        assert!(
            c.resolve(&Symbol::parse("T::sum"), &[TypeInfo::complex(span)])
                .is_ok()
        );
    }

    #[test]
    fn registered_native_cast_enables_conversion() {
        let wrapper = StructType::new("Wrapped");
        wrapper
            .add_member("value", NativeType::Float.into(), None)
            .unwrap();
        let mut members = FunctionClass::new("Wrapped");
        let cast = members
            .create_special_function(SpecialSymbol::NativeTypeCast)
            .with_arg("v", NativeType::Float);
        members.add_function(cast);
        wrapper.set_function_class(members);
        wrapper.finalise_alignment().unwrap();
        let wrapper: ComplexTypePtr = Arc::new(wrapper);

        let mut c = FunctionClass::new("T");
        c.add_function(
            FunctionData::new("use", NativeType::Void).with_arg("w", TypeInfo::complex(wrapper)),
        );

        assert!(
            c.resolve(&Symbol::parse("T::use"), &[NativeType::Float.into()])
                .is_ok()
        );
        assert!(
            c.resolve(&Symbol::parse("T::use"), &[NativeType::Integer.into()])
                .is_err()
        );
    }

    #[test]
    fn constants_and_lookup() {
        let mut c = FunctionClass::new("Math");
        c.add_function_constant("TWO", Value::Double(2.0));
        assert!(c.has_constant(&Symbol::parse("Math::TWO")));
        assert_eq!(
            c.constant_value(&Symbol::parse("Math::TWO")),
            Some(Value::Double(2.0))
        );
        assert!(!c.has_constant(&Symbol::parse("Math::THREE")));
    }

    #[test]
    fn add_inliner_only_once() {
        let mut c = FunctionClass::new("T");
        c.add_function(overload(NativeType::Float));
        let id = Symbol::parse("T::f");

        assert!(!c.is_inlineable(&id));
        assert!(c.add_inliner(&id, Inliner::new(id.clone()).with_high_level(|_| Ok(()))));
        assert!(c.is_inlineable(&id));
        assert!(!c.add_inliner(&id, Inliner::new(id.clone()).with_asm(|_| Ok(()))));
        assert!(c.inliner(&id).is_some_and(|i| !i.can_inline(false)));
    }

    #[test]
    fn function_pointers_move_between_registrations() {
        let mut source = FunctionClass::new("T");
        source.add_function(overload(NativeType::Float));

        let mut target = FunctionClass::new("T");
        target.add_function(FunctionData::new("f", NativeType::Float).with_arg("x", NativeType::Float));

        let mut request = target.functions()[0].clone();
        assert!(!request.is_resolved());
        assert!(source.fill_jit_function_pointer(&mut request));
        assert!(request.is_resolved());

        assert!(target.inject_function_pointer(&request));
        assert!(target.functions()[0].is_resolved());
    }

    #[test]
    fn bound_member_call_name() {
        let mut c = FunctionClass::new("Osc");
        c.add_function(FunctionData::new("reset", NativeType::Void));
        let bound = c.bind_to_object("osc1");
        assert_eq!(FunctionClass::object_call_name(&bound[0]), "osc1.reset");
        assert_eq!(FunctionClass::object_call_name(&c.functions()[0]), "Osc::reset");
    }

    #[test]
    fn special_symbol_names() {
        let c = FunctionClass::new("X");
        assert_eq!(
            c.create_special_function(SpecialSymbol::Subscript).id.qualified_name(),
            "X::operator[]"
        );
        assert_eq!(SpecialSymbol::AssignOverload.id(), "operator=");
    }

    #[test]
    fn api_tree_serializes() {
        let mut c = FunctionClass::new("T").with_description("test class");
        c.add_function(overload(NativeType::Float).with_description("identity"));
        c.add_function_constant("ONE", Value::Integer(1));

        let json = serde_json::to_value(c.api_tree()).unwrap();
        assert_eq!(json["name"], "T");
        assert_eq!(json["functions"][0]["arguments"][0]["type"], "float");
        assert_eq!(json["constants"][0]["value"], "1");
    }

    #[test]
    fn struct_type_is_not_a_native_cast_target() {
        let s: ComplexTypePtr = Arc::new(StructType::new("Plain"));
        assert!(!is_castable(&NativeType::Float.into(), &TypeInfo::complex(s)));
    }
}
