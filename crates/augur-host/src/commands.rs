//! Concrete commands shipped with the host.
//!
//! Payload semantics stay with the command: the channel only moves JSON.
//! Commands expose what they parsed through a shared [`ResultCell`] so
//! callers and successors can read the outcome after resolution.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::command::Command;

/// Shared slot a command fills in when its response arrives.
///
/// Clone it before handing the command to the channel; successors close
/// over their own clone.
#[derive(Debug)]
pub struct ResultCell<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> ResultCell<T> {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Stores a value, replacing any previous one.
    pub fn set(&self, value: T) {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        *slot = Some(value);
    }

    /// Takes the stored value, leaving the cell empty.
    #[must_use]
    pub fn take(&self) -> Option<T> {
        self.slot
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take()
    }

    /// Whether a value has been stored.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .is_some()
    }
}

impl<T> Default for ResultCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ResultCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

/// A command with an arbitrary method and parameters.
///
/// The unit used by embedders that interpret payloads themselves: the raw
/// result value is captured as-is and any server error is recorded but not
/// claimed.
pub struct RawCommand {
    method: String,
    params: Value,
    result: ResultCell<Value>,
}

impl RawCommand {
    /// Creates a command for the given method and parameters.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            result: ResultCell::new(),
        }
    }

    /// The cell the raw result lands in on success.
    #[must_use]
    pub fn result_cell(&self) -> ResultCell<Value> {
        self.result.clone()
    }
}

impl Command for RawCommand {
    fn method(&self) -> &str {
        &self.method
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    fn process_result(&mut self, result: &Value) -> Result<(), serde_json::Error> {
        self.result.set(result.clone());
        Ok(())
    }
}

/// What the server reports about itself during the version handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Protocol version the server claims to speak.
    pub version: Option<String>,
    /// The server's process id, when reported.
    pub pid: Option<u64>,
}

/// The `connection-info` handshake sent by
/// [`CommandChannel::check_protocol`](crate::CommandChannel::check_protocol).
///
/// Version mismatches are detected per-response by the channel and are
/// logged, never fatal; this command just records what the server said.
pub struct ConnectionInfoCommand {
    info: ResultCell<ConnectionInfo>,
}

impl ConnectionInfoCommand {
    /// Creates the handshake command.
    #[must_use]
    pub fn new() -> Self {
        Self {
            info: ResultCell::new(),
        }
    }

    /// The cell the server's self-description lands in.
    #[must_use]
    pub fn info_cell(&self) -> ResultCell<ConnectionInfo> {
        self.info.clone()
    }
}

impl Default for ConnectionInfoCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for ConnectionInfoCommand {
    fn method(&self) -> &str {
        "connection-info"
    }

    fn params(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }

    fn process_result(&mut self, result: &Value) -> Result<(), serde_json::Error> {
        self.info.set(ConnectionInfo {
            version: result
                .get("version")
                .and_then(Value::as_str)
                .map(str::to_owned),
            pid: result.get("pid").and_then(Value::as_u64),
        });
        Ok(())
    }
}
