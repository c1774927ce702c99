//! # Properties and Change Notification
//!
//! Typed property values and the observer list every distributed object
//! carries.
//!
//! ## Invariants
//!
//! - A property converts to and from its wire form without loss for every
//!   value the wire form can express. `from_wire` returns `None` rather than
//!   truncating or coercing.
//! - Observers are called with no lock held, so an observer may subscribe,
//!   unsubscribe or set another property.

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde_json::Value;

use zonewire::ObjectRef;

/// A type that can be stored in a distributed object property.
pub trait PropertyValue: Clone + Send + Sync + 'static {
    fn to_wire(&self) -> Value;
    fn from_wire(value: Value) -> Option<Self>;
}

macro_rules! signed {
    ($($t:ty),*) => {$(
        impl PropertyValue for $t {
            fn to_wire(&self) -> Value {
                Value::from(*self)
            }

            fn from_wire(value: Value) -> Option<Self> {
                value.as_i64().and_then(|n| <$t>::try_from(n).ok())
            }
        }
    )*};
}

macro_rules! unsigned {
    ($($t:ty),*) => {$(
        impl PropertyValue for $t {
            fn to_wire(&self) -> Value {
                Value::from(*self)
            }

            fn from_wire(value: Value) -> Option<Self> {
                value.as_u64().and_then(|n| <$t>::try_from(n).ok())
            }
        }
    )*};
}

signed!(i8, i16, i32, i64);
unsigned!(u8, u16, u32, u64);

impl PropertyValue for f64 {
    fn to_wire(&self) -> Value {
        Value::from(*self)
    }

    fn from_wire(value: Value) -> Option<Self> {
        value.as_f64()
    }
}

impl PropertyValue for f32 {
    fn to_wire(&self) -> Value {
        Value::from(*self)
    }

    fn from_wire(value: Value) -> Option<Self> {
        let wide = value.as_f64()?;
        let narrow = wide as f32;
        (f64::from(narrow) == wide).then_some(narrow)
    }
}

impl PropertyValue for bool {
    fn to_wire(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_wire(value: Value) -> Option<Self> {
        value.as_bool()
    }
}

impl PropertyValue for String {
    fn to_wire(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_wire(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PropertyValue for Value {
    fn to_wire(&self) -> Value {
        self.clone()
    }

    fn from_wire(value: Value) -> Option<Self> {
        Some(value)
    }
}

/// Object-valued properties hold a reference, never the object itself.
impl PropertyValue for ObjectRef {
    fn to_wire(&self) -> Value {
        self.to_value()
    }

    fn from_wire(value: Value) -> Option<Self> {
        ObjectRef::from_value(&value)
    }
}

impl<T: PropertyValue> PropertyValue for Option<T> {
    fn to_wire(&self) -> Value {
        match self {
            Some(v) => v.to_wire(),
            None => Value::Null,
        }
    }

    fn from_wire(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            v => T::from_wire(v).map(Some),
        }
    }
}

impl<T: PropertyValue> PropertyValue for Vec<T> {
    fn to_wire(&self) -> Value {
        Value::Array(self.iter().map(PropertyValue::to_wire).collect())
    }

    fn from_wire(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_wire).collect(),
            _ => None,
        }
    }
}

/// One property of one object took a new value.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyChange {
    pub object: ObjectRef,
    pub property: &'static str,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(&PropertyChange) + Send + Sync>;

/// The change listeners of a single object.
#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    list: RwLock<Vec<(ObserverId, Observer)>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&PropertyChange) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.list
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(f)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut list = self.list.write().unwrap_or_else(PoisonError::into_inner);
        let before = list.len();
        list.retain(|(other, _)| *other != id);
        list.len() != before
    }

    pub fn len(&self) -> usize {
        self.list.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, change: &PropertyChange) {
        let snapshot: Vec<Observer> = self
            .list
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, f)| f.clone())
            .collect();

        for observer in snapshot {
            observer(change);
        }
    }
}
