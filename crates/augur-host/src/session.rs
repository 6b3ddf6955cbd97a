//! Session orchestration: one server, one channel, one drain.
//!
//! A [`Session`] is one-shot: construct, [`start`](Session::start), use,
//! [`stop`](Session::stop). The sequence counter and pending registry are
//! scoped to it; a restart means a fresh session with both reset.

use std::io::{self, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::process::Child;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::channel::CommandChannel;
use crate::command::CommandHandle;
use crate::commands::{ConnectionInfo, ResultCell};
use crate::config::ServerConfig;
use crate::drain::LogDrain;
use crate::errors::StartupError;
use crate::event::{EventBroadcaster, SessionEvent};
use crate::supervisor;

/// Log target for session orchestration.
const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Extension points around the fixed start/stop orchestration.
///
/// The session implements the ordering once; implementations plug in the
/// connection-specific behaviour: a handshake after launch, a clean
/// shutdown command before teardown. Both hooks are best-effort and must
/// not block indefinitely.
pub trait Lifecycle: Send {
    /// Runs after the server is launched and the channel connected.
    fn on_start(&mut self, channel: &Arc<CommandChannel>) {
        let _ = channel;
    }

    /// Runs at the top of [`Session::stop`], while the channel is still
    /// connected, so a clean shutdown command can go out first.
    fn on_stop(&mut self, channel: &Arc<CommandChannel>) {
        let _ = channel;
    }
}

/// A lifecycle with no extension behaviour.
pub struct DefaultLifecycle;

impl Lifecycle for DefaultLifecycle {}

/// One logical connection to an analysis server.
///
/// Owns the child process, the command channel, the reader thread and the
/// log drain worker. Dropping a running session stops it.
pub struct Session {
    config: ServerConfig,
    lifecycle: Box<dyn Lifecycle>,
    channel: Arc<CommandChannel>,
    drain: LogDrain,
    events: Arc<EventBroadcaster>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
    stopped: bool,
}

impl Session {
    /// Creates an unstarted session writing diagnostics to `sink`.
    ///
    /// Subscribe before [`start`](Session::start) to observe the
    /// [`SessionEvent::Started`] event.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        lifecycle: Box<dyn Lifecycle>,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        let drain = LogDrain::new(sink);
        let channel = Arc::new(CommandChannel::new(
            config.label.clone(),
            config.trace,
            drain.handle(),
        ));
        Self {
            config,
            lifecycle,
            channel,
            drain,
            events: Arc::new(EventBroadcaster::new()),
            child: None,
            reader: None,
            stopping: Arc::new(AtomicBool::new(false)),
            stopped: false,
        }
    }

    /// The session label, usually the project name.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// The protocol engine bound to this session.
    #[must_use]
    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    /// Registers an observer for status events.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Launches the server and brings the session up.
    ///
    /// Starts the drain worker, spawns the process, wires its stdin into
    /// the channel, starts the reader thread, runs the lifecycle's
    /// start hook and broadcasts [`SessionEvent::Started`]. A session that
    /// is already running or already stopped is left as it is.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupError`] when the executable cannot be found or
    /// spawned, or when its standard streams cannot be captured; the
    /// session is then still unstarted and no threads are left behind.
    pub fn start(&mut self) -> Result<(), StartupError> {
        if self.child.is_some() || self.stopped {
            return Ok(());
        }
        debug!(target: SESSION_TARGET, session = %self.config.label, "starting session");
        self.drain.start(&self.config.label);

        let mut child = supervisor::spawn_server(&self.config)?;
        let Some(stdin) = child.stdin.take() else {
            return Err(self.abort_start(&mut child, "failed to capture server stdin"));
        };
        let Some(stdout) = child.stdout.take() else {
            return Err(self.abort_start(&mut child, "failed to capture server stdout"));
        };

        self.channel.connect(Box::new(stdin));
        let reader = match supervisor::spawn_reader(
            stdout,
            Arc::clone(&self.channel),
            Arc::clone(&self.events),
            self.drain.handle(),
            Arc::clone(&self.stopping),
        ) {
            Ok(reader) => reader,
            Err(spawn_error) => {
                self.channel.disconnect();
                supervisor::terminate_child(&mut child, &self.config.label);
                return Err(StartupError::SpawnFailed {
                    message: "failed to start the reader thread".to_owned(),
                    source: spawn_error,
                });
            }
        };
        self.child = Some(child);
        self.reader = Some(reader);

        self.lifecycle.on_start(&self.channel);
        self.events.broadcast(&SessionEvent::Started {
            label: self.config.label.clone(),
        });
        debug!(target: SESSION_TARGET, session = %self.config.label, "session started");
        Ok(())
    }

    /// Sends a command without waiting for its response.
    pub fn send_command(&self, command: &CommandHandle) {
        self.channel.send_command(command);
    }

    /// Sends a command and blocks until it resolves; `true` iff it
    /// succeeded.
    pub fn send_command_sync(&self, command: &CommandHandle) -> bool {
        self.channel.send_command_sync(command)
    }

    /// Sends the asynchronous version handshake.
    pub fn check_protocol(&self) -> ResultCell<ConnectionInfo> {
        self.channel.check_protocol()
    }

    /// Tears the session down. Infallible and idempotent.
    ///
    /// Order: lifecycle stop hook (channel still connected), drain worker
    /// shutdown, stream disconnect, child termination, reader join, then
    /// the [`SessionEvent::Stopped`] broadcast. Every step is best-effort;
    /// a failure in one never prevents the rest. Blocks only until
    /// termination has been requested, not until the OS reaps the child.
    ///
    /// Commands still pending are abandoned, not resolved; a caller must
    /// not hold a synchronous wait across `stop`.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.stopping.store(true, Ordering::SeqCst);
        debug!(target: SESSION_TARGET, session = %self.config.label, "stopping session");

        // The one step that runs third-party code; contain it like the rest.
        let hook = catch_unwind(AssertUnwindSafe(|| {
            self.lifecycle.on_stop(&self.channel);
        }));
        if hook.is_err() {
            warn!(target: SESSION_TARGET, session = %self.config.label, "lifecycle stop hook panicked");
        }

        self.drain.shutdown();
        self.channel.disconnect();
        if let Some(mut child) = self.child.take() {
            supervisor::terminate_child(&mut child, &self.config.label);
        }
        if let Some(reader) = self.reader.take()
            && reader.join().is_err()
        {
            warn!(target: SESSION_TARGET, session = %self.config.label, "reader thread panicked");
        }
        self.events.broadcast(&SessionEvent::Stopped {
            label: self.config.label.clone(),
        });
        debug!(target: SESSION_TARGET, session = %self.config.label, "session stopped");
    }

    fn abort_start(&self, child: &mut Child, message: &str) -> StartupError {
        supervisor::terminate_child(child, &self.config.label);
        StartupError::SpawnFailed {
            message: message.to_owned(),
            source: io::Error::other(message),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::tests::support::SharedSink;

    fn unstarted_session() -> Session {
        let config = ServerConfig::new("augur-server", "proj");
        Session::new(
            config,
            Box::new(DefaultLifecycle),
            Box::new(SharedSink::default()),
        )
    }

    #[rstest]
    fn stop_before_start_is_safe() {
        let mut session = unstarted_session();
        let events = session.subscribe();

        session.stop();
        session.stop();

        assert_eq!(
            events.try_recv(),
            Ok(SessionEvent::Stopped {
                label: "proj".to_owned()
            })
        );
        assert!(events.try_recv().is_err(), "stop must broadcast only once");
    }

    #[rstest]
    fn start_after_stop_is_a_no_op() {
        let mut session = unstarted_session();
        session.stop();

        session.start().expect("start after stop must be a no-op");

        assert!(!session.channel().is_connected());
    }

    #[rstest]
    fn commands_on_an_unstarted_session_do_not_block() {
        let session = unstarted_session();
        let command =
            CommandHandle::new(crate::commands::RawCommand::new("ping", serde_json::json!({})));

        session.send_command(&command);

        assert!(!session.send_command_sync(&command));
        assert!(command.is_waiting());
    }

    struct PanickyLifecycle;

    impl Lifecycle for PanickyLifecycle {
        fn on_stop(&mut self, _channel: &Arc<CommandChannel>) {
            panic!("hook gone wrong");
        }
    }

    #[rstest]
    fn stop_contains_a_panicking_hook() {
        let config = ServerConfig::new("augur-server", "proj");
        let mut session = Session::new(
            config,
            Box::new(PanickyLifecycle),
            Box::new(SharedSink::default()),
        );

        session.stop();
    }
}
