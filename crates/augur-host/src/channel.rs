//! The command channel: sequencing, send, receive, dispatch.
//!
//! Turns [`CommandHandle`]s into wire requests and correlated responses
//! back into resolved commands. Protocol faults never escape as errors:
//! they are drained and logged, and only a synchronous command's boolean
//! outcome reaches callers.

use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use augur_wire::{LineWriter, PROTOCOL_VERSION, Response};
use tracing::{debug, error, warn};

use crate::command::{CommandHandle, CommandState};
use crate::commands::{ConnectionInfo, ConnectionInfoCommand};
use crate::drain::DrainHandle;
use crate::registry::PendingRegistry;

/// Log target for channel operations.
const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

/// Trace prefix for requests written to the server.
pub const TO_SERVER_PREFIX: &str = "[augur-server] << ";

/// Trace prefix for responses read from the server.
pub const FROM_SERVER_PREFIX: &str = "[augur-server] >> ";

type WireSink = LineWriter<Box<dyn Write + Send>>;

/// The protocol engine of one session.
///
/// Any number of caller threads may send concurrently; exactly one reader
/// thread feeds [`process_response`](Self::process_response). The pending
/// registry is the only state shared between those roles, and its lock is
/// never held while a command's own monitor is touched.
pub struct CommandChannel {
    label: String,
    trace: bool,
    next_sequence: AtomicU64,
    registry: PendingRegistry,
    writer: Mutex<Option<WireSink>>,
    drain: DrainHandle,
}

impl CommandChannel {
    /// Creates a disconnected channel; [`connect`](Self::connect) wires in
    /// the server's input stream.
    #[must_use]
    pub fn new(label: impl Into<String>, trace: bool, drain: DrainHandle) -> Self {
        Self {
            label: label.into(),
            trace,
            next_sequence: AtomicU64::new(1),
            registry: PendingRegistry::new(),
            writer: Mutex::new(None),
            drain,
        }
    }

    /// The session label this channel traces under.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the channel currently has a server input stream.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.writer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .is_some()
    }

    pub(crate) fn connect(&self, sink: Box<dyn Write + Send>) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        *writer = Some(LineWriter::new(sink));
    }

    pub(crate) fn disconnect(&self) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        *writer = None;
    }

    pub(crate) fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Sends a command without waiting for its response.
    ///
    /// No-op when the channel is not connected. A write failure is drained
    /// and logged but the command stays registered and unresolved; callers
    /// see it stuck in [`CommandState::Waiting`]. The outgoing line is
    /// mirrored to the drain whenever tracing is on, regardless of the
    /// write outcome.
    pub fn send_command(&self, command: &CommandHandle) {
        let mut writer_slot = self
            .writer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let Some(writer) = writer_slot.as_mut() else {
            return;
        };

        let id = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        command.set_sequence(id);
        self.registry.insert(id, command.clone());

        let request = command.to_request(id);
        match serde_json::to_string(&request) {
            Ok(line) => {
                debug!(target: CHANNEL_TARGET, session = %self.label, id, method = %request.method, "sending command");
                if let Err(send_error) = writer.send_line(&line) {
                    self.log_message(format!("sending command {id} failed: {send_error}"));
                }
                if self.trace {
                    self.drain
                        .enqueue(format!("{}/{TO_SERVER_PREFIX}{line}", self.label));
                }
            }
            Err(codec_error) => {
                self.log_message(format!("serialising command {id} failed: {codec_error}"));
            }
        }
    }

    /// Sends a command and blocks until it resolves.
    ///
    /// Returns `true` iff the command resolved successfully, in which case
    /// its successors have already run on this thread. The wait is
    /// unbounded; a response the server never sends (or a send failure)
    /// leaves the caller blocked.
    pub fn send_command_sync(&self, command: &CommandHandle) -> bool {
        if !self.is_connected() {
            return false;
        }
        command.mark_sync();
        self.send_command(command);

        let resolved = command.wait_until_resolved() == CommandState::Done;
        if resolved {
            // We are on the calling thread: the one place successor
            // execution is guaranteed synchronous with the call site.
            command.run_successors();
        }
        resolved
    }

    /// Sends the `connection-info` version handshake asynchronously.
    ///
    /// Mismatches surface through the per-response version check, which
    /// logs and keeps going; the returned cell fills in with whatever the
    /// server reported about itself.
    pub fn check_protocol(&self) -> crate::commands::ResultCell<ConnectionInfo> {
        let command = ConnectionInfoCommand::new();
        let cell = command.info_cell();
        self.send_command(&CommandHandle::new(command));
        cell
    }

    /// Consumes one parsed response from the reader thread.
    ///
    /// Returns `true` iff a pending command was resolved successfully.
    pub fn process_response(&self, response: &Response) -> bool {
        let id = response.id;
        // Dequeue before any validation: a response is consumed at most
        // once, even when the rest of it turns out to be unusable.
        let command = u64::try_from(id)
            .ok()
            .and_then(|key| self.registry.remove(key));

        if !self.check_response_version(response) {
            return false;
        }
        if id <= 0 {
            self.log_message("could not read the id of a response");
            return false;
        }
        let Some(command) = command else {
            self.log_message(format!("no pending command matches response id {id}"));
            return false;
        };

        if let Some(result) = &response.result {
            match command.complete_with_result(result) {
                Ok(()) => {
                    debug!(target: CHANNEL_TARGET, session = %self.label, id, "command resolved");
                    if !command.is_sync() {
                        // Not ours to defer: asynchronous successors run
                        // here, on the reader thread.
                        command.run_successors();
                    }
                    true
                }
                Err(parse_error) => {
                    self.log_message(format!("processing result of command {id} failed: {parse_error}"));
                    false
                }
            }
        } else if let Some(server_error) = &response.error {
            if !command.offer_error(&server_error.name, &server_error.message) {
                self.log_message(format!(
                    "command {id} failed: {}: {}",
                    server_error.name, server_error.message
                ));
            }
            command.fail();
            false
        } else {
            command.fail();
            self.log_message(format!("response {id} carried neither result nor error"));
            false
        }
    }

    /// Validates the protocol version declared on a response.
    fn check_response_version(&self, response: &Response) -> bool {
        match response.version.as_deref() {
            None => {
                self.log_message("could not read the protocol version of a response");
                false
            }
            Some(version) if version != PROTOCOL_VERSION => {
                warn!(
                    target: CHANNEL_TARGET,
                    session = %self.label,
                    server = version,
                    expected = PROTOCOL_VERSION,
                    "protocol version mismatch"
                );
                false
            }
            Some(_) => true,
        }
    }

    /// Routes a diagnostic through the drain and the tracing log.
    fn log_message(&self, message: impl Into<String>) {
        let message = message.into();
        error!(target: CHANNEL_TARGET, session = %self.label, "{message}");
        self.drain.enqueue(message);
    }

    /// Mirrors one inbound line to the drain when tracing is on.
    pub(crate) fn trace_inbound(&self, line: &str) {
        if self.trace {
            self.drain
                .enqueue(format!("{}/{FROM_SERVER_PREFIX}{line}", self.label));
        }
    }
}
