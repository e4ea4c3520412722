//! Native scalar kinds and compile-time values.

use std::fmt;

/// Native scalar kinds known to the type system.
///
/// `Pointer` is only used for references to complex types; `Dynamic` marks a
/// type that was not resolved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NativeType {
    /// No value.
    Void,
    /// 32-bit signed integer.
    Integer,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// A MIDI-like event.
    Event,
    /// A block of samples (pointer + length).
    Block,
    /// Reference to a complex type.
    Pointer,
    /// Not yet resolved.
    #[default]
    Dynamic,
}

impl NativeType {
    /// Size of one value in bytes.
    pub const fn size(self) -> usize {
        match self {
            NativeType::Void | NativeType::Dynamic => 0,
            NativeType::Integer | NativeType::Float => 4,
            NativeType::Double | NativeType::Pointer => 8,
            NativeType::Event | NativeType::Block => 16,
        }
    }

    /// Alignment of one value in bytes.
    pub const fn alignment(self) -> usize {
        match self {
            NativeType::Void | NativeType::Dynamic => 1,
            NativeType::Integer | NativeType::Float => 4,
            NativeType::Double | NativeType::Pointer | NativeType::Event | NativeType::Block => 8,
        }
    }

    /// Keyword used in source code and signatures.
    pub const fn name(self) -> &'static str {
        match self {
            NativeType::Void => "void",
            NativeType::Integer => "int",
            NativeType::Float => "float",
            NativeType::Double => "double",
            NativeType::Event => "event",
            NativeType::Block => "block",
            NativeType::Pointer => "pointer",
            NativeType::Dynamic => "dynamic",
        }
    }

    /// Whether values of this type are stored as numbers.
    pub const fn is_arithmetic(self) -> bool {
        matches!(
            self,
            NativeType::Integer | NativeType::Float | NativeType::Double
        )
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar value, used for compile-time constants, initialiser lists and
/// free-function arguments.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    /// No value.
    #[default]
    Void,
    /// 32-bit signed integer.
    Integer(i32),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
}

impl Value {
    /// The native kind of this value.
    pub const fn native_type(&self) -> NativeType {
        match self {
            Value::Void => NativeType::Void,
            Value::Integer(_) => NativeType::Integer,
            Value::Float(_) => NativeType::Float,
            Value::Double(_) => NativeType::Double,
        }
    }

    /// Numeric value as `f64` (`0.0` for `Void`).
    pub fn to_f64(&self) -> f64 {
        match *self {
            Value::Void => 0.0,
            Value::Integer(v) => v as f64,
            Value::Float(v) => v as f64,
            Value::Double(v) => v,
        }
    }

    /// Numeric value as `f32`.
    pub fn to_f32(&self) -> f32 {
        self.to_f64() as f32
    }

    /// Numeric value as `i32`, truncating floating point values.
    pub fn to_i32(&self) -> i32 {
        match *self {
            Value::Integer(v) => v,
            other => other.to_f64() as i32,
        }
    }

    /// Converts the value to another arithmetic kind.
    ///
    /// Returns `None` for non-arithmetic targets or a `Void` source.
    pub fn cast(self, target: NativeType) -> Option<Value> {
        if matches!(self, Value::Void) {
            return None;
        }

        match target {
            NativeType::Integer => Some(Value::Integer(self.to_i32())),
            NativeType::Float => Some(Value::Float(self.to_f32())),
            NativeType::Double => Some(Value::Double(self.to_f64())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}f"),
            Value::Double(v) => write!(f, "{v:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_abi() {
        assert_eq!(NativeType::Integer.size(), 4);
        assert_eq!(NativeType::Double.size(), 8);
        assert_eq!(NativeType::Event.size(), 16);
        assert_eq!(NativeType::Dynamic.size(), 0);
    }

    #[test]
    fn cast_between_kinds() {
        assert_eq!(Value::Float(2.5).cast(NativeType::Integer), Some(Value::Integer(2)));
        assert_eq!(Value::Integer(3).cast(NativeType::Double), Some(Value::Double(3.0)));
        assert_eq!(Value::Void.cast(NativeType::Float), None);
        assert_eq!(Value::Float(1.0).cast(NativeType::Event), None);
    }

    #[test]
    fn display_marks_float_literals() {
        assert_eq!(Value::Float(0.5).to_string(), "0.5f");
        assert_eq!(Value::Double(1.0).to_string(), "1.0");
        assert_eq!(Value::Integer(-4).to_string(), "-4");
    }
}
