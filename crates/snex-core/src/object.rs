//! Instance memory of a compiled class.

use std::fmt;
use std::sync::Arc;

use crate::complex::{ComplexType, StructType, read_value, write_value};
use crate::error::TypeError;
use crate::value::Value;

/// The data of one class instance, laid out by its [`StructType`].
///
/// Member access by index goes through the finalised layout and takes no
/// lock, so callbacks may use it on the audio thread.
#[derive(Clone)]
pub struct ObjectMemory {
    ty: Arc<StructType>,
    data: Vec<u8>,
}

impl ObjectMemory {
    /// Allocates an instance and writes the member defaults.
    pub fn new(ty: Arc<StructType>) -> Result<Self, TypeError> {
        if !ty.is_finalised() {
            return Err(TypeError::NotFinalised(ty.type_name()));
        }
        let mut memory = Self {
            data: vec![0; ty.required_byte_size()],
            ty,
        };
        memory.reset()?;
        Ok(memory)
    }

    /// Writes the member defaults again.
    pub fn reset(&mut self) -> Result<(), TypeError> {
        self.ty.initialise(&mut self.data, &self.ty.default_initialiser())
    }

    /// Layout of this instance.
    pub fn object_type(&self) -> &Arc<StructType> {
        &self.ty
    }

    /// Raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Value of member `index`.
    pub fn get(&self, index: usize) -> Option<Value> {
        let (offset, t) = self.ty.member_slot(index)?;
        read_value(&self.data, offset, t)
    }

    /// Writes member `index`, converting `value` to the member type.
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), TypeError> {
        let (offset, t) = self.ty.member_slot(index).ok_or(TypeError::OutOfBounds {
            offset: index,
            size: self.ty.num_members(),
        })?;
        write_value(&mut self.data, offset, t, value)
    }

    /// Value of the member called `id`.
    pub fn member(&self, id: &str) -> Option<Value> {
        self.get(self.ty.member_index(id)?)
    }

    /// Writes the member called `id`.
    pub fn set_member(&mut self, id: &str, value: Value) -> Result<(), TypeError> {
        let index = self
            .ty
            .member_index(id)
            .ok_or_else(|| TypeError::InvalidStore {
                value: value.to_string(),
                target: format!("{}::{id}", self.ty.id()),
            })?;
        self.set(index, value)
    }

    /// Member `index` as `f32`, `0.0` if missing.
    #[inline]
    pub fn float(&self, index: usize) -> f32 {
        self.get(index).map_or(0.0, |v| v.to_f32())
    }

    /// Writes member `index` from an `f32`. Returns `false` if it failed.
    #[inline]
    pub fn set_float(&mut self, index: usize, value: f32) -> bool {
        self.set(index, Value::Float(value)).is_ok()
    }

    /// Member `index` as `f64`, `0.0` if missing.
    #[inline]
    pub fn double(&self, index: usize) -> f64 {
        self.get(index).map_or(0.0, |v| v.to_f64())
    }

    /// Writes member `index` from an `f64`. Returns `false` if it failed.
    #[inline]
    pub fn set_double(&mut self, index: usize, value: f64) -> bool {
        self.set(index, Value::Double(value)).is_ok()
    }

    /// Member `index` as `i32`, `0` if missing.
    #[inline]
    pub fn int(&self, index: usize) -> i32 {
        self.get(index).map_or(0, |v| v.to_i32())
    }

    /// Writes member `index` from an `i32`. Returns `false` if it failed.
    #[inline]
    pub fn set_int(&mut self, index: usize, value: i32) -> bool {
        self.set(index, Value::Integer(value)).is_ok()
    }

    /// Debug rendering of all members.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.ty.dump(&mut out, 0, &self.data);
        out
    }
}

impl fmt::Debug for ObjectMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectMemory")
            .field("type", &self.ty.id())
            .field("size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::Initialiser;
    use crate::value::NativeType;

    fn counter_type() -> Arc<StructType> {
        let t = StructType::new("Counter");
        t.add_member("step", NativeType::Float.into(), Some(Initialiser::Value(Value::Float(0.5))))
            .unwrap();
        t.add_member("count", NativeType::Integer.into(), None).unwrap();
        t.finalise_alignment().unwrap();
        Arc::new(t)
    }

    #[test]
    fn instance_starts_with_defaults() {
        let m = ObjectMemory::new(counter_type()).unwrap();
        assert_eq!(m.float(0), 0.5);
        assert_eq!(m.member("count"), Some(Value::Integer(0)));
    }

    #[test]
    fn set_converts_to_member_type() {
        let mut m = ObjectMemory::new(counter_type()).unwrap();
        assert!(m.set_double(1, 3.7));
        assert_eq!(m.int(1), 3);
        assert!(!m.set_float(5, 1.0));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut m = ObjectMemory::new(counter_type()).unwrap();
        m.set_member("step", Value::Float(2.0)).unwrap();
        m.reset().unwrap();
        assert_eq!(m.float(0), 0.5);
    }

    #[test]
    fn unfinalised_type_is_rejected() {
        let t = Arc::new(StructType::new("Open"));
        assert!(matches!(
            ObjectMemory::new(t),
            Err(TypeError::NotFinalised(_))
        ));
    }

    #[test]
    fn unknown_member_is_an_error() {
        let mut m = ObjectMemory::new(counter_type()).unwrap();
        assert!(m.set_member("missing", Value::Float(1.0)).is_err());
    }
}
