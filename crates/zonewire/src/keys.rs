//! Reserved field names and well-known paths.

/// Dot-separated path naming the handler of a command.
pub const API_URL: &str = "apiURL";
/// Id of the callback a command answers or carries.
pub const CALLBACK_ID: &str = "callbackId";
/// Zone whose store owns `callbackId`.
pub const ZONE: &str = "zone";
/// Error half of a callback response. Null on success.
pub const ERROR: &str = "error";
/// Data half of a callback response.
pub const CALLBACK_DATA: &str = "callbackData";

pub const TYPE_NAME: &str = "typeName";
pub const RECORD_ID: &str = "recordId";
/// Full property payload of a pushed object.
pub const DATA: &str = "data";

/// Paths served by the distributed object dispatcher on every zone.
pub mod api {
    /// Namespace the dispatcher is mounted under.
    pub const NAMESPACE: &str = "DistributedObjects";
    pub const CALL_METHOD: &str = "DistributedObjects.callMethod";
    pub const CALL_CLASS_METHOD: &str = "DistributedObjects.callClassMethod";
    pub const PUSH_OBJECT: &str = "DistributedObjects.pushObject";
}
