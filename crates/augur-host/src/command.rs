//! The command unit and its completion state machine.
//!
//! A command starts `Waiting` and resolves exactly once to `Done` or
//! `Error`; nothing leaves a terminal state. Each command carries its own
//! monitor (mutex plus condvar) so a synchronous caller can block on it
//! without touching the registry lock, keeping the two locking disciplines
//! disjoint.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use augur_wire::Request;
use serde_json::Value;

/// The payload of a command: what to send and how to consume the answer.
///
/// Implementations are opaque to the channel; it only serialises
/// [`method`](Command::method) and [`params`](Command::params) onto the wire
/// and feeds the correlated response back through
/// [`process_result`](Command::process_result) or
/// [`on_error`](Command::on_error).
pub trait Command: Send {
    /// The wire method name.
    fn method(&self) -> &str;

    /// Method-specific request fields.
    fn params(&self) -> Value;

    /// Consumes a successful result.
    ///
    /// # Errors
    ///
    /// Returns the decode error when the result does not have the shape the
    /// command expects; the command then resolves to [`CommandState::Error`].
    fn process_result(&mut self, result: &Value) -> Result<(), serde_json::Error>;

    /// Offers the command first refusal of a server-reported error.
    ///
    /// Returns `true` when the command claims the error; unclaimed errors
    /// are logged by the channel. The command resolves to
    /// [`CommandState::Error`] either way.
    fn on_error(&mut self, name: &str, message: &str) -> bool {
        let _ = (name, message);
        false
    }
}

/// Completion state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Sent (or about to be sent) and awaiting a response.
    Waiting,
    /// Resolved successfully.
    Done,
    /// Resolved with a domain error or a result-processing failure.
    Error,
}

type Successor = Box<dyn FnOnce() + Send>;

struct Inner {
    command: Box<dyn Command>,
    state: CommandState,
    sync: bool,
    sequence: u64,
    successors: Vec<Successor>,
}

struct Shared {
    inner: Mutex<Inner>,
    resolved: Condvar,
}

/// Shared handle to one in-flight command.
///
/// Cloned into the pending registry when sent; the creating caller keeps its
/// own clone to observe the outcome. All clones see the same state machine.
#[derive(Clone)]
pub struct CommandHandle {
    shared: Arc<Shared>,
}

impl CommandHandle {
    /// Wraps a command payload into a dispatchable handle.
    #[must_use]
    pub fn new(command: impl Command + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    command: Box::new(command),
                    state: CommandState::Waiting,
                    sync: false,
                    sequence: 0,
                    successors: Vec::new(),
                }),
                resolved: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Recover from poisoning so teardown paths still observe the state
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Current completion state.
    #[must_use]
    pub fn state(&self) -> CommandState {
        self.lock().state
    }

    /// Whether the command is still awaiting resolution.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.state() == CommandState::Waiting
    }

    /// The sequence number assigned at send time; 0 before being sent.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    /// Whether a caller is (or will be) blocked on this command.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.lock().sync
    }

    /// Registers a continuation to run once the command resolves
    /// successfully.
    ///
    /// Successors run exactly once: on the calling thread for synchronous
    /// commands (before `send_command_sync` returns) and on the reader
    /// thread for asynchronous ones. Commands resolving to
    /// [`CommandState::Error`] drop their successors unrun.
    pub fn add_successor(&self, successor: impl FnOnce() + Send + 'static) {
        self.lock().successors.push(Box::new(successor));
    }

    pub(crate) fn set_sequence(&self, sequence: u64) {
        self.lock().sequence = sequence;
    }

    pub(crate) fn mark_sync(&self) {
        self.lock().sync = true;
    }

    pub(crate) fn to_request(&self, id: u64) -> Request {
        let inner = self.lock();
        Request::new(id, inner.command.method(), inner.command.params())
    }

    /// Delivers a successful result and transitions to a terminal state.
    ///
    /// Already-resolved commands ignore the delivery: a response is consumed
    /// at most once.
    pub(crate) fn complete_with_result(&self, result: &Value) -> Result<(), serde_json::Error> {
        let mut inner = self.lock();
        if inner.state != CommandState::Waiting {
            return Ok(());
        }
        let outcome = inner.command.process_result(result);
        inner.state = match outcome {
            Ok(()) => CommandState::Done,
            Err(_) => CommandState::Error,
        };
        drop(inner);
        self.shared.resolved.notify_all();
        outcome
    }

    /// Offers a server-reported error to the command's own handler.
    pub(crate) fn offer_error(&self, name: &str, message: &str) -> bool {
        self.lock().command.on_error(name, message)
    }

    /// Transitions to `Error` unless already terminal.
    pub(crate) fn fail(&self) {
        let mut inner = self.lock();
        if inner.state == CommandState::Waiting {
            inner.state = CommandState::Error;
        }
        drop(inner);
        self.shared.resolved.notify_all();
    }

    /// Runs and discards the registered successors.
    pub(crate) fn run_successors(&self) {
        let successors = {
            let mut inner = self.lock();
            std::mem::take(&mut inner.successors)
        };
        for successor in successors {
            successor();
        }
    }

    /// Blocks until the command leaves `Waiting`.
    ///
    /// The predicate is re-checked after every wake, so spurious wakeups
    /// only cost another loop iteration.
    pub(crate) fn wait_until_resolved(&self) -> CommandState {
        let mut inner = self.lock();
        while inner.state == CommandState::Waiting {
            inner = self
                .shared
                .resolved
                .wait(inner)
                .unwrap_or_else(|poison| poison.into_inner());
        }
        inner.state
    }
}

impl std::fmt::Debug for CommandHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CommandHandle")
            .field("method", &inner.command.method())
            .field("state", &inner.state)
            .field("sequence", &inner.sequence)
            .field("sync", &inner.sync)
            .finish()
    }
}
