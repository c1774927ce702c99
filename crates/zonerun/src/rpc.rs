//! # RPC Dispatcher
//!
//! Invokes methods on objects and classes that live in the other zone, and
//! serves the same calls when they arrive here.
//!
//! ## Wire Protocol
//!
//! | apiURL                              | payload                          |
//! |-------------------------------------|----------------------------------|
//! | `DistributedObjects.callMethod`     | `object`, `method`, `args`       |
//! | `DistributedObjects.callClassMethod`| `className`, `method`, `args`    |
//! | `DistributedObjects.pushObject`     | `object` (with `data`)           |
//!
//! `method` is a name or a chain of names. Args go to the last method of a
//! chain; each earlier method's return becomes the next receiver, and a list
//! return applies the next method to every element.
//!
//! ## Invariants
//!
//! - An inbound call runs inside a batch. The batch is closed, and its
//!   pushes sent, before the caller's callback is answered.
//! - A call whose receiver, class or method cannot be found is logged and
//!   dropped. Its callback never fires.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use zonewire::Command;
use zonewire::ObjectRef;
use zonewire::api;

use crate::arg;
use crate::arg::Arg;
use crate::callback::Callback;
use crate::callback::Reply;
use crate::object;
use crate::object::DistributedObject;
use crate::route::SubRouter;
use crate::router;
use crate::runtime::Runtime;

pub const OBJECT: &str = "object";
pub const METHOD: &str = "method";
pub const ARGS: &str = "args";
pub const CLASS_NAME: &str = "className";

/// What a method returns: a value, or an application error passed to the
/// caller as the `error` half of its reply.
pub type MethodResult = std::result::Result<Arg, Value>;

/// A named namespace of static methods, reachable through `callClassMethod`.
pub trait ClassObject: Send + Sync + 'static {
    /// Calls a method by its wire name. `None` if there is no such method.
    fn invoke(&self, rt: &Runtime, method: &str, args: Vec<Arg>) -> Option<MethodResult>;
}

/// A method name, or a chain of them.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MethodPath {
    Single(String),
    Chain(Vec<String>),
}

impl MethodPath {
    pub fn steps(&self) -> Vec<&str> {
        match self {
            MethodPath::Single(name) => vec![name.as_str()],
            MethodPath::Chain(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MethodPath::Single(name) => Value::from(name.as_str()),
            MethodPath::Chain(names) => Value::from(names.clone()),
        }
    }
}

impl From<&str> for MethodPath {
    fn from(name: &str) -> Self {
        MethodPath::Single(name.to_string())
    }
}

impl From<String> for MethodPath {
    fn from(name: String) -> Self {
        MethodPath::Single(name)
    }
}

impl From<&[&str]> for MethodPath {
    fn from(names: &[&str]) -> Self {
        MethodPath::Chain(names.iter().map(|n| n.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for MethodPath {
    fn from(names: [&str; N]) -> Self {
        MethodPath::from(&names[..])
    }
}

impl std::fmt::Display for MethodPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.steps().join("."))
    }
}

/// The conventional `{errorCode, description}` application error.
pub fn app_error(code: impl Into<Value>, description: &str) -> Value {
    serde_json::json!({ "errorCode": code.into(), "description": description })
}

#[derive(Debug)]
pub enum Error {
    Router(router::Error),
    Object(object::Error),
    /// A payload field is absent or has the wrong shape.
    MissingField(&'static str),
    UnknownClass(String),
    UnknownMethod { receiver: String, method: MethodPath },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Router(e) => write!(f, "Router error: {}", e),
            Self::Object(e) => write!(f, "Object error: {}", e),
            Self::MissingField(field) => write!(f, "missing or malformed field: {}", field),
            Self::UnknownClass(name) => write!(f, "unknown class: {}", name),
            Self::UnknownMethod { receiver, method } => {
                write!(f, "{} has no method {}", receiver, method)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<router::Error> for Error {
    fn from(e: router::Error) -> Self {
        Self::Router(e)
    }
}

impl From<object::Error> for Error {
    fn from(e: object::Error) -> Self {
        Self::Object(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Runtime {
    /// Calls `method` on the other zone's instance of `object`.
    pub fn call_method_on_remote(
        &self,
        object: &ObjectRef,
        method: impl Into<MethodPath>,
        args: &[Arg],
        callback: Option<Callback>,
    ) -> Result<()> {
        let command = Command::new(api::CALL_METHOD)
            .with(OBJECT, object.to_value())
            .with(METHOD, method.into().to_value())
            .with(ARGS, self.marshal_args(args));
        self.router().send_command_to_remote(command, callback)?;
        Ok(())
    }

    /// Calls `method` on the class registered as `class_name` in the other
    /// zone. The other zone runs the call inside a batch, so every object it
    /// touches is pushed once before the callback fires.
    pub fn call_class_method(
        &self,
        class_name: &str,
        method: impl Into<MethodPath>,
        args: &[Arg],
        callback: Option<Callback>,
    ) -> Result<()> {
        let command = Command::new(api::CALL_CLASS_METHOD)
            .with(CLASS_NAME, class_name)
            .with(METHOD, method.into().to_value())
            .with(ARGS, self.marshal_args(args));
        self.router().send_command_to_remote(command, callback)?;
        Ok(())
    }

    fn marshal_args(&self, args: &[Arg]) -> Value {
        Value::Array(args.iter().map(|a| self.marshal(a)).collect())
    }

    pub fn begin_batch(&self) {
        self.batch().begin();
    }

    /// Closes one batch level. When the outermost level closes, every pending
    /// object is pushed once. Returns the number of pushes sent.
    pub fn end_batch(&self) -> usize {
        if !self.batch().end() {
            return 0;
        }

        let mut pushed = 0;
        while let Some(object) = self.batch().next_pending() {
            let Some(instance) = self.session().resolve(&object) else {
                warn!(object = %object, "queued object is not cached, skipping push");
                continue;
            };
            let command = Command::new(api::PUSH_OBJECT).with(OBJECT, instance.serialize(true));
            match self.router().send_command_to_remote(command, None) {
                Ok(()) => pushed += 1,
                Err(e) => warn!(object = %object, error = %e, "push failed"),
            }
        }
        if pushed > 0 {
            debug!(zone = %self.zone(), pushed, "batch flushed");
        }
        pushed
    }

    /// Runs `f` inside a batch.
    pub fn with_batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.begin_batch();
        let result = f();
        self.end_batch();
        result
    }

    /// Marks `object` for a push to the other zone. Outside any batch the
    /// push happens immediately; inside one it waits for the outermost end.
    pub fn queue_object_for_sync(&self, object: &dyn DistributedObject) {
        self.begin_batch();
        self.batch().enqueue(object.object_ref());
        self.end_batch();
    }
}

/// Serves the well-known `DistributedObjects.*` paths.
pub struct RpcRoutes;

impl SubRouter<Runtime> for RpcRoutes {
    fn dispatch_command(&self, rt: &Runtime, remaining: &[&str], command: Command) {
        let result = match remaining {
            ["callMethod"] => handle_call_method(rt, &command),
            ["callClassMethod"] => handle_call_class_method(rt, &command),
            ["pushObject"] => handle_push_object(rt, &command),
            _ => {
                warn!(api_url = ?command.api_url, "unknown dispatcher operation, dropping command");
                return;
            }
        };
        if let Err(e) = result {
            warn!(zone = %rt.zone(), api_url = ?command.api_url, error = %e, "dropping command");
        }
    }
}

fn method_path(command: &Command) -> Result<MethodPath> {
    let value = command.get(METHOD).ok_or(Error::MissingField(METHOD))?;
    MethodPath::deserialize(value).map_err(|_| Error::MissingField(METHOD))
}

fn unmarshal_args(rt: &Runtime, command: &Command) -> Result<Vec<Arg>> {
    let Some(value) = command.get(ARGS) else {
        return Ok(Vec::new());
    };
    let items = value.as_array().ok_or(Error::MissingField(ARGS))?;
    let args = items
        .iter()
        .map(|item| arg::unmarshal(rt, item))
        .collect::<object::Result<Vec<_>>>()?;
    Ok(args)
}

fn handle_call_method(rt: &Runtime, command: &Command) -> Result<()> {
    let object = command
        .get(OBJECT)
        .and_then(ObjectRef::from_value)
        .ok_or(Error::MissingField(OBJECT))?;
    let method = method_path(command)?;
    let args = unmarshal_args(rt, command)?;
    let receiver = rt.session().construct(&object)?;

    let outcome = rt.with_batch(|| {
        invoke_chain(rt, &method.steps(), args, |name, args| receiver.invoke(rt, name, args))
    });
    let Some(result) = outcome else {
        return Err(Error::UnknownMethod {
            receiver: object.to_string(),
            method,
        });
    };
    answer(rt, command, result);
    Ok(())
}

fn handle_call_class_method(rt: &Runtime, command: &Command) -> Result<()> {
    let class_name = command
        .get(CLASS_NAME)
        .and_then(Value::as_str)
        .ok_or(Error::MissingField(CLASS_NAME))?;
    let class = rt
        .class(class_name)
        .ok_or_else(|| Error::UnknownClass(class_name.to_string()))?;
    let method = method_path(command)?;
    let args = unmarshal_args(rt, command)?;

    let outcome = rt.with_batch(|| {
        invoke_chain(rt, &method.steps(), args, |name, args| class.invoke(rt, name, args))
    });
    let Some(result) = outcome else {
        return Err(Error::UnknownMethod {
            receiver: class_name.to_string(),
            method,
        });
    };
    answer(rt, command, result);
    Ok(())
}

fn handle_push_object(rt: &Runtime, command: &Command) -> Result<()> {
    let object = command.get(OBJECT).ok_or(Error::MissingField(OBJECT))?;
    let instance = rt.session().materialize(object)?;
    debug!(zone = %rt.zone(), object = %instance.object_ref(), "applied push");
    Ok(())
}

fn answer(rt: &Runtime, command: &Command, result: MethodResult) {
    let reply = match result {
        Ok(value) => Reply::ok(rt.marshal(&value)),
        Err(error) => Reply::err(error),
    };
    rt.router().respond(command, reply);
}

/// Runs a chain of methods. `first` invokes the head on the original
/// receiver; later steps invoke on whatever the previous step returned.
fn invoke_chain(
    rt: &Runtime,
    steps: &[&str],
    mut args: Vec<Arg>,
    first: impl FnOnce(&str, Vec<Arg>) -> Option<MethodResult>,
) -> Option<MethodResult> {
    let (head, tail) = steps.split_first()?;
    let head_args = if tail.is_empty() {
        std::mem::take(&mut args)
    } else {
        Vec::new()
    };

    let mut current = match first(*head, head_args)? {
        Ok(value) => value,
        Err(e) => return Some(Err(e)),
    };
    for (i, step) in tail.iter().copied().enumerate() {
        let step_args = if i + 1 == tail.len() {
            std::mem::take(&mut args)
        } else {
            Vec::new()
        };
        current = match invoke_step(rt, current, step, step_args)? {
            Ok(value) => value,
            Err(e) => return Some(Err(e)),
        };
    }
    Some(Ok(current))
}

fn invoke_step(rt: &Runtime, receiver: Arg, method: &str, args: Vec<Arg>) -> Option<MethodResult> {
    match receiver {
        Arg::Object(object) => object.invoke(rt, method, args),
        Arg::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match invoke_step(rt, item, method, args.clone())? {
                    Ok(value) => out.push(value),
                    Err(e) => return Some(Err(e)),
                }
            }
            Some(Ok(Arg::List(out)))
        }
        _ => None,
    }
}
