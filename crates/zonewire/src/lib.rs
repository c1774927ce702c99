//! # zonewire
//!
//! The envelope format for commands that cross between two mutually untrusted
//! zones.
//!
//! ## Architecture
//!
//! The boundary only carries strings. Everything that crosses it is a
//! [`Command`]: a keyed JSON structure with an optional `apiURL`, an optional
//! callback handle and arbitrary payload fields. Objects travel as
//! [`ObjectRef`]s and callables travel as [`CallbackHandle`]s, so an encoded
//! command never carries state or code.
//!
//! This crate is pure data. Routing, callback stores and identity caches live
//! in `zonerun`.

pub mod command;
pub mod error;
pub mod keys;
pub mod types;


pub use command::Command;
pub use error::Error;
pub use error::Result;
pub use keys::api;
pub use types::CallbackHandle;
pub use types::ObjectRef;
pub use types::RecordId;
pub use types::Zone;
