//! Fully qualified names with a type and an optional constant value.

use std::fmt;

use crate::types::TypeInfo;
use crate::value::Value;

/// A qualified name such as `Math::PI` plus its type.
///
/// Equality only looks at the path, so a lookup symbol without type
/// information finds the typed registration.
#[derive(Clone, Default)]
pub struct Symbol {
    path: Vec<String>,
    type_info: TypeInfo,
    constant: Option<Value>,
}

impl Symbol {
    /// A single-segment symbol.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            path: vec![id.into()],
            ..Self::default()
        }
    }

    /// A symbol from path segments.
    pub fn from_path<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parses `a::b::c`.
    pub fn parse(qualified: &str) -> Self {
        Self::from_path(qualified.split("::").filter(|s| !s.is_empty()))
    }

    /// Returns a copy with a type attached.
    pub fn with_type(mut self, type_info: TypeInfo) -> Self {
        self.type_info = type_info;
        self
    }

    /// Returns a copy carrying a compile-time constant.
    ///
    /// The symbol becomes const and, if its type was unresolved, takes the
    /// value's type.
    pub fn with_constant(mut self, value: Value) -> Self {
        if self.type_info.is_dynamic() {
            self.type_info = TypeInfo::native(value.native_type());
        }
        self.type_info = self.type_info.with_const(true);
        self.constant = Some(value);
        self
    }

    /// Last path segment.
    pub fn id(&self) -> &str {
        self.path.last().map_or("", String::as_str)
    }

    /// All path segments.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Type of the symbol.
    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    /// Compile-time constant, if any.
    pub fn constant(&self) -> Option<Value> {
        self.constant
    }

    /// Whether the symbol can't be assigned to.
    pub fn is_const(&self) -> bool {
        self.constant.is_some() || self.type_info.is_const()
    }

    /// Whether the path is non-empty.
    pub fn is_valid(&self) -> bool {
        !self.path.is_empty()
    }

    /// The enclosing scope (`a::b` for `a::b::c`), without type.
    pub fn parent(&self) -> Symbol {
        let len = self.path.len().saturating_sub(1);
        Self::from_path(self.path[..len].iter().cloned())
    }

    /// A child of this symbol (`a::b` → `a::b::c`).
    pub fn child(&self, id: impl Into<String>) -> Symbol {
        let mut path = self.path.clone();
        path.push(id.into());
        Self::from_path(path)
    }

    /// Whether `other` is directly or transitively inside this scope.
    pub fn is_parent_of(&self, other: &Symbol) -> bool {
        other.path.len() > self.path.len() && other.path.starts_with(&self.path)
    }

    /// `a::b::c`.
    pub fn qualified_name(&self) -> String {
        self.path.join("::")
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Symbol {}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({} {})", self.type_info, self.qualified_name())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::NativeType;

    #[test]
    fn parent_and_child_navigation() {
        let s = Symbol::parse("Math::abs");
        assert_eq!(s.id(), "abs");
        assert_eq!(s.parent(), Symbol::new("Math"));
        assert_eq!(Symbol::new("Math").child("abs"), s);
        assert!(Symbol::new("Math").is_parent_of(&s));
        assert!(!s.is_parent_of(&s));
    }

    #[test]
    fn constants_are_const_and_typed() {
        let s = Symbol::parse("Math::PI").with_constant(Value::Double(2.5));
        assert!(s.is_const());
        assert_eq!(s.type_info().native_type(), NativeType::Double);
        assert_eq!(s.constant(), Some(Value::Double(2.5)));
    }

    #[test]
    fn equality_ignores_type() {
        let a = Symbol::new("x").with_type(NativeType::Float.into());
        let b = Symbol::new("x");
        assert_eq!(a, b);
    }

    #[test]
    fn root_parent_is_empty() {
        assert!(!Symbol::new("x").parent().is_valid());
    }
}
