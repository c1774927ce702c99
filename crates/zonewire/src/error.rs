//! # Error Definitions
//!
//! Everything that can go wrong while turning a wire string into a `Command`
//! or back again.

/// Failures of the envelope codec.
#[derive(Debug)]
pub enum Error {
    /// The payload was not valid JSON, or a reserved field had the wrong shape.
    Json(serde_json::Error),
    /// The payload parsed, but the top level was not a keyed structure.
    NotAnObject,
    /// A zone tag that names neither side of the boundary.
    InvalidZone(u8),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(e) => write!(f, "JSON error: {}", e),
            Self::NotAnObject => write!(f, "command is not an object"),
            Self::InvalidZone(tag) => write!(f, "invalid zone tag: {}", tag),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
