//! Type descriptors.
//!
//! [`TypeInfo`] is either a native scalar kind or a reference to a shared
//! [`ComplexType`]. Complex types are always passed by reference, so a
//! complex `TypeInfo` reports [`NativeType::Pointer`] and `is_ref() == true`
//! no matter how it was constructed.
//!
//! Two complex types are the same type when their canonical strings hash
//! equal, which lets independently built but identical aggregates unify.

use std::fmt;
use std::sync::Arc;

use crate::complex::ComplexType;
use crate::value::NativeType;

/// Shared handle to a complex type.
pub type ComplexTypePtr = Arc<dyn ComplexType>;

/// 64-bit FNV-1a hash.
///
/// Used for content hashes that must be stable across processes (type
/// identity, network description hashes).
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

#[derive(Clone)]
enum Kind {
    Native(NativeType),
    Complex(ComplexTypePtr),
}

/// Type of a symbol, argument or return value.
#[derive(Clone)]
pub struct TypeInfo {
    kind: Kind,
    is_const: bool,
    is_ref: bool,
}

impl Default for TypeInfo {
    fn default() -> Self {
        Self::native(NativeType::Dynamic)
    }
}

impl TypeInfo {
    /// A native scalar type.
    pub const fn native(t: NativeType) -> Self {
        Self {
            kind: Kind::Native(t),
            is_const: false,
            is_ref: false,
        }
    }

    /// A reference to a complex type.
    pub fn complex(t: ComplexTypePtr) -> Self {
        Self {
            kind: Kind::Complex(t),
            is_const: false,
            is_ref: true,
        }
    }

    /// An unresolved type.
    pub const fn dynamic() -> Self {
        Self::native(NativeType::Dynamic)
    }

    /// Returns a copy with the const flag set.
    pub fn with_const(mut self, is_const: bool) -> Self {
        self.is_const = is_const;
        self
    }

    /// Returns a copy with the reference flag set.
    ///
    /// Complex types stay references.
    pub fn with_ref(mut self, is_ref: bool) -> Self {
        self.is_ref = is_ref || self.is_complex();
        self
    }

    /// The native kind, `Pointer` for complex types.
    pub fn native_type(&self) -> NativeType {
        match &self.kind {
            Kind::Native(t) => *t,
            Kind::Complex(_) => NativeType::Pointer,
        }
    }

    /// The complex type, if any.
    pub fn complex_type(&self) -> Option<&ComplexTypePtr> {
        match &self.kind {
            Kind::Native(_) => None,
            Kind::Complex(c) => Some(c),
        }
    }

    /// Whether this names a complex type.
    pub fn is_complex(&self) -> bool {
        matches!(self.kind, Kind::Complex(_))
    }

    /// `false` for `void` and unresolved types.
    pub fn is_valid(&self) -> bool {
        !matches!(
            self.native_type(),
            NativeType::Void | NativeType::Dynamic
        )
    }

    /// Whether the type is still unresolved.
    pub fn is_dynamic(&self) -> bool {
        self.native_type() == NativeType::Dynamic
    }

    /// Const flag.
    pub fn is_const(&self) -> bool {
        self.is_const
    }

    /// Reference flag.
    pub fn is_ref(&self) -> bool {
        self.is_ref
    }

    /// Storage size of one value.
    pub fn required_byte_size(&self) -> usize {
        match &self.kind {
            Kind::Native(t) => t.size(),
            Kind::Complex(c) => c.required_byte_size(),
        }
    }

    /// Storage alignment of one value.
    pub fn required_alignment(&self) -> usize {
        match &self.kind {
            Kind::Native(t) => t.alignment(),
            Kind::Complex(c) => c.required_alignment(),
        }
    }

    /// Type name without qualifiers.
    pub fn type_name(&self) -> String {
        match &self.kind {
            Kind::Native(t) => t.name().to_string(),
            Kind::Complex(c) => c.alias().map_or_else(|| c.type_name(), str::to_string),
        }
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (Kind::Complex(a), Kind::Complex(b)) => a.content_hash() == b.content_hash(),
            (Kind::Native(a), Kind::Native(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypeInfo {}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            f.write_str("const ")?;
        }
        f.write_str(&self.type_name())?;
        if self.is_ref {
            f.write_str("&")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeInfo({self})")
    }
}

impl From<NativeType> for TypeInfo {
    fn from(t: NativeType) -> Self {
        Self::native(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::SpanType;

    #[test]
    fn complex_types_are_always_references() {
        let span: ComplexTypePtr = Arc::new(SpanType::new(NativeType::Float.into(), 2));
        let t = TypeInfo::complex(span).with_ref(false);
        assert!(t.is_ref());
        assert_eq!(t.native_type(), NativeType::Pointer);
    }

    #[test]
    fn qualifiers_do_not_affect_equality() {
        let a = TypeInfo::native(NativeType::Float).with_const(true);
        let b = TypeInfo::native(NativeType::Float).with_ref(true);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "const float");
        assert_eq!(b.to_string(), "float&");
    }

    #[test]
    fn void_and_dynamic_are_invalid() {
        assert!(!TypeInfo::default().is_valid());
        assert!(!TypeInfo::native(NativeType::Void).is_valid());
        assert!(TypeInfo::native(NativeType::Event).is_valid());
    }

    #[test]
    fn native_never_equals_complex() {
        let span: ComplexTypePtr = Arc::new(SpanType::new(NativeType::Float.into(), 1));
        assert_ne!(TypeInfo::complex(span), TypeInfo::native(NativeType::Pointer));
    }

    #[test]
    fn fnv_is_stable() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_ne!(fnv1a(b"a"), fnv1a(b"b"));
    }
}
