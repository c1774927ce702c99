//! # Command Envelope
//!
//! The only unit that crosses the boundary.
//!
//! ```text
//! {
//!   "apiURL": "Namespace.Sub.method",   // path-dispatched commands
//!   "callbackId": 7,                     // once a callback has been marshaled
//!   "zone": 0,                           // whose store owns callbackId
//!   ...payload fields...
//! }
//! ```
//!
//! ## Invariants
//!
//! - **Panic Safety**: decoding returns `Result`, never panics on unknown data.
//! - **Order Preservation**: payload keys keep the order they were written in.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;
use crate::keys;
use crate::types::CallbackHandle;
use crate::types::Zone;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "apiURL", default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(rename = "callbackId", default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<Zone>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Command {
    /// A command addressed at the handler registered under `api_url`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: Some(api_url.into()),
            ..Self::default()
        }
    }

    /// A response to `handle`, carrying the reserved `error` and
    /// `callbackData` fields and no path.
    pub fn response(handle: CallbackHandle, error: Option<Value>, data: Value) -> Self {
        let mut command = Self::default();
        command.set_callback_handle(handle);
        command.insert(keys::ERROR, error.unwrap_or(Value::Null));
        command.insert(keys::CALLBACK_DATA, data);
        command
    }

    /// Builder-style payload insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.payload.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.payload.remove(key)
    }

    /// The callback this command carries, if both id and zone are present.
    pub fn callback_handle(&self) -> Option<CallbackHandle> {
        Some(CallbackHandle::new(self.callback_id?, self.zone?))
    }

    pub fn set_callback_handle(&mut self, handle: CallbackHandle) {
        self.callback_id = Some(handle.id);
        self.zone = Some(handle.zone);
    }

    /// The application error of a response. A JSON null counts as no error.
    pub fn error(&self) -> Option<&Value> {
        self.get(keys::ERROR).filter(|v| !v.is_null())
    }

    /// The data of a response, `Null` when absent.
    pub fn callback_data(&self) -> &Value {
        self.get(keys::CALLBACK_DATA).unwrap_or(&Value::Null)
    }

    /// Serializes to the string the transport carries.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a wire string. Anything that is not a JSON object is rejected
    /// with `NotAnObject`; reserved fields of the wrong type with `Json`.
    pub fn decode(wire: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(wire)?;
        if !value.is_object() {
            return Err(Error::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }
}
