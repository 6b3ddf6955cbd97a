//! Request and response message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version the client expects on every response.
pub const PROTOCOL_VERSION: &str = "0.1";

/// Sentinel returned when a response carries no usable `id`.
///
/// A missing id and an invalid one are indistinguishable downstream, so both
/// collapse to a non-positive value that never matches a pending command.
const MISSING_ID: i64 = -1;

fn missing_id() -> i64 {
    MISSING_ID
}

/// An outbound request: `{"id": N, "method": "...", "params": {...}}`.
///
/// Ids are assigned by the command channel, start at 1 and increment by 1;
/// they are never reused within a session.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Channel-assigned sequence number, always positive.
    pub id: u64,
    /// The operation the server should perform.
    pub method: String,
    /// Method-specific fields, opaque to the channel.
    pub params: Value,
}

impl Request {
    /// Creates a request for the given method and parameters.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// An inbound response line.
///
/// Success carries `result`; failure carries `error`. The `version` field is
/// validated by the channel on every response; a response without one is
/// treated as malformed.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// The id of the request this response answers; `-1` when absent.
    #[serde(default = "missing_id")]
    pub id: i64,
    /// Protocol version declared by the server.
    #[serde(default)]
    pub version: Option<String>,
    /// The result on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(default)]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Parses one wire line into a response.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Codec` when the line is not a JSON object of
    /// the expected shape.
    pub fn parse(line: &str) -> Result<Self, crate::TransportError> {
        serde_json::from_str(line).map_err(crate::TransportError::Codec)
    }
}

/// The structured error object of a failed response.
///
/// The server is expected to populate both fields; either may be missing in
/// practice and defaults to empty so a malformed error still resolves its
/// command rather than poisoning the whole line.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    /// Machine-readable error name.
    #[serde(default)]
    pub name: String,
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
}
