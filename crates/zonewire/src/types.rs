//! Identity types that appear on the wire.
//!
//! Instead of passing bare integers and strings around, every identity that
//! crosses the boundary has its own type, so a record id can never be handed
//! to something expecting a callback id.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::Error;
use crate::keys;

/// One side of the boundary.
///
/// Exactly one zone is active per runtime. It is chosen at startup and never
/// changes afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Zone {
    Public = 0,
    Privileged = 1,
}

impl Zone {
    /// The zone on the far side of the boundary.
    pub fn other(self) -> Zone {
        match self {
            Zone::Public => Zone::Privileged,
            Zone::Privileged => Zone::Public,
        }
    }
}

impl From<Zone> for u8 {
    fn from(zone: Zone) -> u8 {
        zone as u8
    }
}

impl TryFrom<u8> for Zone {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Error> {
        match tag {
            0 => Ok(Zone::Public),
            1 => Ok(Zone::Privileged),
            other => Err(Error::InvalidZone(other)),
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Zone::Public => write!(f, "public"),
            Zone::Privileged => write!(f, "privileged"),
        }
    }
}

/// The stable identifier of a record. Remote systems hand out both numeric
/// and string ids, so both are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    /// Reads a record id out of a JSON value. Only integers and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(n) => Value::from(*n),
            RecordId::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<i32> for RecordId {
    fn from(id: i32) -> Self {
        RecordId::Int(i64::from(id))
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Str(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Str(id)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Str(s) => write!(f, "{}", s),
        }
    }
}

/// The wire form of a distributed object: enough to find or build it, never
/// its fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "typeName")]
    pub type_name: String,
    #[serde(rename = "recordId")]
    pub record_id: RecordId,
}

impl ObjectRef {
    pub fn new(type_name: impl Into<String>, record_id: impl Into<RecordId>) -> Self {
        Self {
            type_name: type_name.into(),
            record_id: record_id.into(),
        }
    }

    /// True if `value` has the reference shape: a map carrying a string
    /// `typeName` and an integer or string `recordId`. Extra keys (such as
    /// `data`) are allowed.
    pub fn matches(value: &Value) -> bool {
        Self::from_value(value).is_some()
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let type_name = map.get(keys::TYPE_NAME)?.as_str()?;
        let record_id = RecordId::from_value(map.get(keys::RECORD_ID)?)?;
        Some(Self::new(type_name, record_id))
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(keys::TYPE_NAME.into(), Value::from(self.type_name.as_str()));
        map.insert(keys::RECORD_ID.into(), self.record_id.to_value());
        Value::Object(map)
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.type_name, self.record_id)
    }
}

/// A numeric stand-in for a callable that lives in `zone`.
///
/// Ids are only meaningful together with the zone that minted them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackHandle {
    #[serde(rename = "callbackId")]
    pub id: u64,
    pub zone: Zone,
}

impl CallbackHandle {
    pub fn new(id: u64, zone: Zone) -> Self {
        Self { id, zone }
    }

    /// Reads a handle out of a JSON value. Both `callbackId` and a valid
    /// `zone` must be present, anything else is treated as plain data.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let id = map.get(keys::CALLBACK_ID)?.as_u64()?;
        let tag = map.get(keys::ZONE)?.as_u64()?;
        let zone = u8::try_from(tag).ok().and_then(|t| Zone::try_from(t).ok())?;
        Some(Self { id, zone })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(keys::CALLBACK_ID.into(), Value::from(self.id));
        map.insert(keys::ZONE.into(), Value::from(u8::from(self.zone)));
        Value::Object(map)
    }
}

impl std::fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cb-{}@{}", self.id, self.zone)
    }
}
