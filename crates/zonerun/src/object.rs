//! # Distributed Objects
//!
//! The base shape of every entity whose state crosses the boundary, and the
//! per-zone session that owns them.
//!
//! ## Philosophy
//!
//! - **References, not Ownership**: a property that points at another object
//!   stores its `ObjectRef`. The identity cache owns every instance, so cycles
//!   between objects are just keys pointing at each other.
//! - **Closed Schema**: a type declares its properties once, through
//!   `distributed_object!`. Keys the schema does not know are skipped.
//!
//! ## Invariants
//!
//! - Within one session, all paths that produce an instance for
//!   `(typeName, recordId)` return the same `Arc`.
//! - `deserialize` and `materialize` check every reference in a payload,
//!   nested `data` included, before they construct or assign anything. A
//!   payload naming an unregistered type changes nothing.
//! - One change notification per assigned property, in payload order.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use zonewire::ObjectRef;
use zonewire::RecordId;
use zonewire::keys;

use crate::arg::Arg;
use crate::cache::IdentityCache;
use crate::property::Observers;
use crate::rpc::MethodResult;
use crate::runtime::Runtime;

#[derive(Debug)]
pub enum Error {
    /// No constructor is registered for this type name.
    UnknownType(String),
    UnknownProperty { type_name: String, property: String },
    /// The wire value does not convert to the declared property type.
    TypeMismatch { type_name: String, property: String },
    /// Expected a keyed structure.
    NotAHash,
    /// The canonical instance for this identity has a different Rust type.
    WrongType(ObjectRef),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownType(name) => write!(f, "unknown object type: {}", name),
            Self::UnknownProperty { type_name, property } => {
                write!(f, "{} has no property {}", type_name, property)
            }
            Self::TypeMismatch { type_name, property } => {
                write!(f, "wrong value type for {}.{}", type_name, property)
            }
            Self::NotAHash => write!(f, "expected a keyed structure"),
            Self::WrongType(object) => write!(f, "{} is registered with another type", object),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

pub type ObjectHandle = Arc<dyn DistributedObject>;

/// An entity whose state can be serialized across the boundary.
///
/// Implemented by `distributed_object!`; implementing it by hand is possible
/// but the macro keeps the property table and the accessors in sync.
pub trait DistributedObject: Send + Sync + 'static {
    fn type_name(&self) -> &str;
    fn record_id(&self) -> RecordId;
    /// Wire keys of the declared properties, in declaration order.
    fn property_names(&self) -> &'static [&'static str];
    /// Wire value of one property.
    fn property(&self, name: &str) -> Option<Value>;
    /// Converts `value` to the property's type, stores it and notifies.
    fn apply(&self, name: &str, value: Value) -> Result<()>;
    fn observers(&self) -> &Observers;
    /// Calls a method by its wire name. `None` if there is no such method.
    fn invoke(&self, rt: &Runtime, method: &str, args: Vec<Arg>) -> Option<MethodResult>;
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.type_name(), self.record_id())
    }

    /// `{typeName, recordId}` and, with `include_data`, a `data` hash of
    /// every declared property. Referenced objects appear as refs only.
    fn serialize(&self, include_data: bool) -> Value {
        let mut wire = self.object_ref().to_value();
        if include_data {
            let mut data = Map::new();
            for name in self.property_names() {
                if let Some(value) = self.property(name) {
                    data.insert(name.to_string(), value);
                }
            }
            if let Value::Object(map) = &mut wire {
                map.insert(keys::DATA.into(), Value::Object(data));
            }
        }
        wire
    }
}

/// Static side of a distributed object type.
pub trait Schema: DistributedObject + Sized {
    const TYPE_NAME: &'static str;
    const PROPERTIES: &'static [&'static str];

    /// An instance with every property at its default.
    fn bare(record_id: RecordId) -> Self;
}

type Constructor = fn(RecordId) -> ObjectHandle;

struct Registered {
    build: Constructor,
    properties: &'static [&'static str],
}

fn construct<T: Schema>(record_id: RecordId) -> ObjectHandle {
    Arc::new(T::bare(record_id))
}

/// The identity cache of one zone plus the constructors it may use to build
/// instances it has not seen yet.
pub struct Session {
    cache: IdentityCache,
    types: HashMap<String, Registered>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            cache: IdentityCache::new(),
            types: HashMap::new(),
        }
    }

    pub(crate) fn register_type<T: Schema>(&mut self) {
        let registered = Registered {
            build: construct::<T>,
            properties: T::PROPERTIES,
        };
        self.types.insert(T::TYPE_NAME.to_string(), registered);
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn knows_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registers a freshly built instance and returns the canonical one,
    /// which may be an older instance with the same identity.
    pub fn register<T: Schema>(&self, instance: T) -> Result<Arc<T>> {
        let object = instance.object_ref();
        self.cache
            .add(Arc::new(instance))
            .as_any()
            .downcast::<T>()
            .map_err(|_| Error::WrongType(object))
    }

    pub fn resolve(&self, object: &ObjectRef) -> Option<ObjectHandle> {
        self.cache.get_ref(object)
    }

    pub fn resolve_as<T: Schema>(&self, object: &ObjectRef) -> Option<Arc<T>> {
        self.cache.get_as::<T>(object)
    }

    /// Returns the canonical instance for `object`, building a bare one if
    /// it has not been seen yet.
    pub fn construct(&self, object: &ObjectRef) -> Result<ObjectHandle> {
        if let Some(existing) = self.cache.get_ref(object) {
            return Ok(existing);
        }
        let registered = self
            .types
            .get(&object.type_name)
            .ok_or_else(|| Error::UnknownType(object.type_name.clone()))?;
        debug!(object = %object, "constructing bare instance");
        Ok(self.cache.add((registered.build)(object.record_id.clone())))
    }

    /// Turns a wire reference into the canonical instance. If the reference
    /// carries `data`, it is deserialized into the instance.
    pub fn materialize(&self, value: &Value) -> Result<ObjectHandle> {
        let object = ObjectRef::from_value(value).ok_or(Error::NotAHash)?;
        self.check_reference(value)?;
        let instance = self.construct(&object)?;
        if let Some(data) = value.get(keys::DATA) {
            self.deserialize(instance.as_ref(), data)?;
        }
        Ok(instance)
    }

    /// Assigns every declared key of `data` to `object`, in payload order.
    pub fn deserialize(&self, object: &dyn DistributedObject, data: &Value) -> Result<()> {
        let declared = object.property_names();
        self.check_data(declared, data)?;
        let map = data.as_object().ok_or(Error::NotAHash)?;

        let mut assignments = Vec::with_capacity(map.len());
        for (key, value) in map {
            let Some(name) = declared.iter().find(|name| **name == key.as_str()) else {
                debug!(object = %object.object_ref(), key = %key, "skipping undeclared key");
                continue;
            };
            assignments.push((*name, self.reduce(value)?));
        }

        for (name, value) in assignments {
            if let Err(e) = object.apply(name, value) {
                warn!(object = %object.object_ref(), error = %e, "dropping property");
            }
        }
        Ok(())
    }

    /// Declared properties an instance of `object` has, whether it is cached
    /// already or would be built from a registered type.
    fn properties_of(&self, object: &ObjectRef) -> Result<&'static [&'static str]> {
        if let Some(existing) = self.cache.get_ref(object) {
            return Ok(existing.property_names());
        }
        self.types
            .get(&object.type_name)
            .map(|registered| registered.properties)
            .ok_or_else(|| Error::UnknownType(object.type_name.clone()))
    }

    /// Walks the declared keys of `data` without touching any instance.
    fn check_data(&self, declared: &[&str], data: &Value) -> Result<()> {
        let map = data.as_object().ok_or(Error::NotAHash)?;
        for (key, value) in map {
            if declared.iter().any(|name| *name == key.as_str()) {
                self.check_value(value)?;
            }
        }
        Ok(())
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        if ObjectRef::matches(value) {
            return self.check_reference(value);
        }
        if let Value::Array(items) = value {
            for item in items {
                self.check_value(item)?;
            }
        }
        Ok(())
    }

    fn check_reference(&self, value: &Value) -> Result<()> {
        let object = ObjectRef::from_value(value).ok_or(Error::NotAHash)?;
        let declared = self.properties_of(&object)?;
        match value.get(keys::DATA) {
            Some(data) => self.check_data(declared, data),
            None => Ok(()),
        }
    }

    /// Materializes every reference inside `value` and strips it down to
    /// `{typeName, recordId}`.
    fn reduce(&self, value: &Value) -> Result<Value> {
        if ObjectRef::matches(value) {
            return Ok(self.materialize(value)?.object_ref().to_value());
        }
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.reduce(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }
}
