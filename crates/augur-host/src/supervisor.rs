//! Spawning, draining and terminating the server process.
//!
//! Owns the child's byte streams: requests go down its stdin through the
//! channel's writer, and a dedicated reader thread drains its stdout line
//! by line, handing every parsed response to the channel. Exactly one
//! reader thread exists per session.

use std::io;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use augur_wire::{LineReader, Response};
use tracing::{debug, warn};

use crate::channel::CommandChannel;
use crate::config::ServerConfig;
use crate::drain::DrainHandle;
use crate::errors::StartupError;
use crate::event::{EventBroadcaster, SessionEvent};

/// Log target for process supervision.
const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Grace period between asking a child to die and killing it.
const TERMINATE_GRACE: Duration = Duration::from_millis(200);

/// Launches the server process with piped standard streams.
///
/// The child inherits our environment; stderr is discarded because the
/// protocol and all diagnostics travel over stdin/stdout.
pub(crate) fn spawn_server(config: &ServerConfig) -> Result<Child, StartupError> {
    debug!(
        target: SUPERVISOR_TARGET,
        session = %config.label,
        command = %config.executable.display(),
        args = ?config.args,
        "spawning analysis server"
    );

    let mut command = Command::new(&config.executable);
    command
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    if let Some(dir) = &config.working_dir {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            StartupError::BinaryNotFound {
                command: config.executable.display().to_string(),
                source: e,
            }
        } else {
            StartupError::SpawnFailed {
                message: format!("failed to start {}", config.executable.display()),
                source: e,
            }
        }
    })?;

    debug!(
        target: SUPERVISOR_TARGET,
        session = %config.label,
        pid = child.id(),
        "analysis server spawned"
    );

    Ok(child)
}

/// Starts the reader thread that drains the server's output stream.
///
/// Every line is mirrored to the drain when tracing, parsed, and fed to
/// [`CommandChannel::process_response`]. Stream closure ends the loop; if
/// the session is not already tearing down (`stopping` unset), that is the
/// server dying on its own, and a [`SessionEvent::Stopped`] is broadcast so
/// the owner can run the explicit teardown path.
pub(crate) fn spawn_reader(
    stdout: ChildStdout,
    channel: Arc<CommandChannel>,
    events: Arc<EventBroadcaster>,
    drain: DrainHandle,
    stopping: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    let label = channel.label().to_owned();
    thread::Builder::new()
        .name(format!("{label}/reader"))
        .spawn(move || {
            let mut reader = LineReader::new(stdout);
            loop {
                match reader.read_line() {
                    Ok(Some(line)) => {
                        channel.trace_inbound(&line);
                        match Response::parse(&line) {
                            Ok(parsed) => {
                                channel.process_response(&parsed);
                            }
                            Err(error) => {
                                warn!(target: SUPERVISOR_TARGET, session = %label, %error, "dropping unparseable response line");
                                drain.enqueue(format!("dropping unparseable response line: {error}"));
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(target: SUPERVISOR_TARGET, session = %label, "server closed its output stream");
                        break;
                    }
                    Err(error) => {
                        warn!(target: SUPERVISOR_TARGET, session = %label, %error, "reading from the server failed");
                        drain.enqueue(format!("reading from the server failed: {error}"));
                        break;
                    }
                }
            }
            if !stopping.load(Ordering::SeqCst) {
                events.broadcast(&SessionEvent::Stopped {
                    label: label.clone(),
                });
            }
        })
}

/// Terminates the child, waiting briefly before killing it outright.
///
/// Every path is best-effort; nothing here can fail the caller.
pub(crate) fn terminate_child(child: &mut Child, label: &str) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(target: SUPERVISOR_TARGET, session = %label, ?status, "analysis server already exited");
        }
        Ok(None) => {
            thread::sleep(TERMINATE_GRACE);
            kill_if_running(child, label);
        }
        Err(error) => {
            warn!(target: SUPERVISOR_TARGET, session = %label, %error, "failed to check server status, killing");
            kill_if_running(child, label);
        }
    }
}

fn kill_if_running(child: &mut Child, label: &str) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(target: SUPERVISOR_TARGET, session = %label, ?status, "analysis server exited during grace period");
        }
        Ok(None) | Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
