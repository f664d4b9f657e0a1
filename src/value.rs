use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// A completed parse result with its concrete type erased.
///
/// The typed [`Parser`](crate::Parser) facade puts the type back; inside the
/// combinator tree all values travel in this shape.
pub struct ErasedValue(Box<dyn Any>);

impl ErasedValue {
    pub fn new<T: 'static>(value: T) -> Self {
        ErasedValue(Box::new(value))
    }

    pub fn downcast<T: 'static>(self) -> Result<T, ErasedValue> {
        match self.0.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(other) => Err(ErasedValue(other)),
        }
    }

    pub(crate) fn expect_downcast<T: 'static>(self) -> T {
        self.downcast::<T>()
            .unwrap_or_else(|_| panic!("internal error - value type mismatch in erased channel"))
    }
}

impl std::fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedValue").finish()
    }
}

/// A shared, clonable erased value. Used wherever one resolved value must be
/// handed to several consumers (leaf states, the dependency registry).
#[derive(Clone)]
pub struct SharedValue(Rc<dyn Any>);

impl SharedValue {
    pub fn new<T: 'static>(value: T) -> Self {
        SharedValue(Rc::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Clone the underlying value back out at its concrete type.
    pub fn extract<T: Clone + 'static>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl std::fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedValue").finish()
    }
}

/// The value produced by `object` and `merge`: parse results keyed by field
/// name. Values are taken out once, by name and concrete type.
#[derive(Debug, Default)]
pub struct Record {
    values: HashMap<String, ErasedValue>,
}

impl Record {
    pub(crate) fn insert(&mut self, name: impl Into<String>, value: ErasedValue) {
        self.values.insert(name.into(), value);
    }

    pub(crate) fn absorb(&mut self, other: Record) {
        self.values.extend(other.values);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Remove and downcast one field. `None` when the field is absent or was
    /// requested at the wrong type.
    pub fn take<T: 'static>(&mut self, name: &str) -> Option<T> {
        let value = self.values.remove(name)?;
        match value.downcast::<T>() {
            Ok(value) => Some(value),
            Err(value) => {
                self.values.insert(name.to_string(), value);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The value produced by `tuple` and `concat`: parse results in positional
/// order. Values are taken out once, by index and concrete type.
#[derive(Debug, Default)]
pub struct Seq {
    values: Vec<Option<ErasedValue>>,
}

impl Seq {
    pub(crate) fn push(&mut self, value: ErasedValue) {
        self.values.push(Some(value));
    }

    pub(crate) fn absorb(&mut self, other: Seq) {
        self.values.extend(other.values);
    }

    /// Remove and downcast the value at `index`.
    pub fn take<T: 'static>(&mut self, index: usize) -> Option<T> {
        let slot = self.values.get_mut(index)?;
        let value = slot.take()?;
        match value.downcast::<T>() {
            Ok(value) => Some(value),
            Err(value) => {
                slot.replace(value);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
