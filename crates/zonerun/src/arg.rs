//! # Argument Marshaling
//!
//! Method arguments and return values, and the recursive rule that turns
//! them into wire values and back.
//!
//! | Local            | Wire                       |
//! |------------------|----------------------------|
//! | `Arg::Value`     | unchanged                  |
//! | `Arg::Object`    | `{typeName, recordId}`     |
//! | `Arg::Callback`  | `{callbackId, zone}`       |
//! | `Arg::List`      | array, element-wise        |

use std::sync::Arc;

use serde_json::Value;

use zonewire::CallbackHandle;
use zonewire::ObjectRef;

use crate::callback::Callback;
use crate::callback::CallbackStore;
use crate::object;
use crate::object::DistributedObject;
use crate::object::ObjectHandle;
use crate::runtime::Runtime;

#[derive(Clone)]
pub enum Arg {
    Value(Value),
    Object(ObjectHandle),
    Callback(Callback),
    List(Vec<Arg>),
}

impl std::fmt::Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => write!(f, "Value({})", v),
            Self::Object(o) => write!(f, "Object({})", o.object_ref()),
            Self::Callback(_) => write!(f, "Callback(..)"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
        }
    }
}

impl Arg {
    pub fn null() -> Self {
        Arg::Value(Value::Null)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value()?.as_str()
    }

    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Arg::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The object argument downcast to its concrete type.
    pub fn object<T: DistributedObject>(&self) -> Option<Arc<T>> {
        self.as_object()?.clone().as_any().downcast::<T>().ok()
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Arg::Callback(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Arg]> {
        match self {
            Arg::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Value(Value::from(s))
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Value(Value::String(s))
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Value(Value::from(n))
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Value(Value::Bool(b))
    }
}

impl From<ObjectHandle> for Arg {
    fn from(o: ObjectHandle) -> Self {
        Arg::Object(o)
    }
}

impl<T: DistributedObject> From<Arc<T>> for Arg {
    fn from(o: Arc<T>) -> Self {
        Arg::Object(o)
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(items: Vec<Arg>) -> Self {
        Arg::List(items)
    }
}

/// Reduces `arg` to its wire form. Callbacks are registered in `store` as
/// single-use handles.
pub fn marshal(arg: &Arg, store: &CallbackStore) -> Value {
    match arg {
        Arg::Value(v) => v.clone(),
        Arg::Object(o) => o.object_ref().to_value(),
        Arg::Callback(c) => store.to_handle(c.clone()).to_value(),
        Arg::List(items) => Value::Array(items.iter().map(|a| marshal(a, store)).collect()),
    }
}

/// Rebuilds an argument on the receiving side. References resolve through
/// the identity cache, handles become callables.
pub fn unmarshal(rt: &Runtime, value: &Value) -> object::Result<Arg> {
    if let Value::Array(items) = value {
        return items
            .iter()
            .map(|item| unmarshal(rt, item))
            .collect::<object::Result<Vec<_>>>()
            .map(Arg::List);
    }
    if ObjectRef::matches(value) {
        return rt.session().materialize(value).map(Arg::Object);
    }
    if let Some(handle) = CallbackHandle::from_value(value) {
        return Ok(Arg::Callback(rt.router().from_handle(handle)));
    }
    Ok(Arg::Value(value.clone()))
}
