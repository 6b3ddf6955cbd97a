//! Correlation table for in-flight commands.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::command::CommandHandle;

/// Maps sequence numbers to the commands awaiting their responses.
///
/// Caller threads insert at send time; the reader thread removes when a
/// response arrives. Every read-modify-write happens under the one internal
/// mutex, and that mutex is never held while touching a command's own
/// monitor, so the two locks cannot order-invert.
///
/// An id absent at removal time means "already resolved, unknown, or never
/// sent" — indistinguishable by design, and handled by logging rather than
/// escalation.
#[derive(Default)]
pub(crate) struct PendingRegistry {
    commands: Mutex<HashMap<u64, CommandHandle>>,
}

impl PendingRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a command under its assigned sequence number.
    pub(crate) fn insert(&self, id: u64, command: CommandHandle) {
        let mut commands = self
            .commands
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        commands.insert(id, command);
    }

    /// Removes and returns the command for `id`, if still pending.
    pub(crate) fn remove(&self, id: u64) -> Option<CommandHandle> {
        let mut commands = self
            .commands
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        commands.remove(&id)
    }

    /// Number of commands still awaiting a response.
    pub(crate) fn len(&self) -> usize {
        self.commands
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }
}
