//! # zonerun
//!
//! Lets code in one zone call methods on objects that live in the other zone,
//! across a boundary that only carries strings.
//!
//! ## Architecture
//!
//! ```text
//!   Runtime (one per zone)
//!   ├── Router ─────────── Transport ──────────▶ other zone
//!   │   ├── CallbackStore  (callables <-> handles)
//!   │   └── RouteTable     (apiURL -> handler | sub-router)
//!   ├── Session
//!   │   └── IdentityCache  ((typeName, recordId) -> instance)
//!   ├── classes            (className -> ClassObject)
//!   └── Batch              (pending pushes)
//! ```
//!
//! Remote calls go out as `DistributedObjects.*` commands. The receiving zone
//! resolves the target from its own cache, runs the method inside a batch,
//! pushes every object the method queued, and only then answers.

pub mod arg;
pub mod batch;
pub mod builder;
pub mod cache;
pub mod callback;
pub mod config;
mod macros;
pub mod object;
pub mod property;
pub mod route;
pub mod router;
pub mod rpc;
pub mod runtime;
pub mod transport;

#[cfg(test)]
mod tests;

pub use serde_json;
pub use zonewire;

pub use arg::Arg;
pub use builder::RuntimeBuilder;
pub use callback::Callback;
pub use callback::Reply;
pub use callback::callback;
pub use config::UnknownHandles;
pub use object::DistributedObject;
pub use object::ObjectHandle;
pub use object::Schema;
pub use property::PropertyChange;
pub use rpc::ClassObject;
pub use rpc::MethodResult;
pub use rpc::app_error;
pub use runtime::Runtime;
