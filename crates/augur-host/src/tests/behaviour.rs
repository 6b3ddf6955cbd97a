//! End-to-end behaviour against a scripted fake server.
//!
//! The fake is `/bin/sh` reading request lines from stdin and printing
//! canned response lines, which exercises the real process supervisor,
//! reader thread and drain worker together.

use std::time::{Duration, Instant};

use rstest::rstest;
use serde_json::json;

use crate::command::CommandHandle;
use crate::commands::RawCommand;
use crate::config::ServerConfig;
use crate::errors::StartupError;
use crate::event::SessionEvent;
use crate::session::{DefaultLifecycle, Session};
use crate::tests::support::{SharedSink, echo_server};

const PONG_RESPONSE: &str = r#"{"id": 1, "version": "0.1", "result": "pong"}"#;

fn session_for(config: ServerConfig) -> (Session, SharedSink) {
    let sink = SharedSink::default();
    let session = Session::new(config, Box::new(DefaultLifecycle), Box::new(sink.clone()));
    (session, sink)
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[rstest]
fn start_reports_a_missing_binary() {
    let config = ServerConfig::new("/nonexistent/augur-server", "proj");
    let (mut session, _sink) = session_for(config);

    match session.start() {
        Err(StartupError::BinaryNotFound { command, .. }) => {
            assert!(command.contains("augur-server"));
        }
        Ok(()) => panic!("start must fail for a missing binary"),
        Err(other) => panic!("expected BinaryNotFound, got {other}"),
    }
}

#[rstest]
fn synchronous_round_trip_resolves_the_command() {
    let (mut session, _sink) = session_for(echo_server("proj", PONG_RESPONSE));
    let events = session.subscribe();
    session.start().expect("fake server failed to start");

    let command = RawCommand::new("ping", json!({}));
    let result = command.result_cell();
    let handle = CommandHandle::new(command);

    assert!(session.send_command_sync(&handle));
    assert_eq!(result.take(), Some(json!("pong")));

    session.stop();

    let received: Vec<SessionEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            SessionEvent::Started {
                label: "proj".to_owned()
            },
            SessionEvent::Stopped {
                label: "proj".to_owned()
            },
        ]
    );
}

#[rstest]
fn asynchronous_command_resolves_off_thread() {
    let (mut session, _sink) = session_for(echo_server("proj", PONG_RESPONSE));
    session.start().expect("fake server failed to start");

    let command = RawCommand::new("ping", json!({}));
    let result = command.result_cell();
    let handle = CommandHandle::new(command);
    session.send_command(&handle);

    wait_until(|| !handle.is_waiting());
    assert_eq!(result.take(), Some(json!("pong")));

    session.stop();
}

#[rstest]
fn check_protocol_completes_the_handshake() {
    let response = r#"{"id": 1, "version": "0.1", "result": {"version": "0.1", "pid": 4711}}"#;
    let (mut session, _sink) = session_for(echo_server("proj", response));
    session.start().expect("fake server failed to start");

    let info = session.check_protocol();

    wait_until(|| info.is_filled());
    let info = info.take().expect("handshake info missing");
    assert_eq!(info.version.as_deref(), Some("0.1"));
    assert_eq!(info.pid, Some(4711));

    session.stop();
}

#[rstest]
fn tracing_mirrors_both_directions() {
    let config = echo_server("proj", PONG_RESPONSE).with_trace(true);
    let (mut session, sink) = session_for(config);
    session.start().expect("fake server failed to start");

    let handle = CommandHandle::new(RawCommand::new("ping", json!({})));
    assert!(session.send_command_sync(&handle));
    session.stop();

    let lines = sink.lines();
    assert!(
        lines.iter().any(|line| line.contains("<< ") && line.contains(r#""method":"ping""#)),
        "missing to-server trace in {lines:?}"
    );
    assert!(
        lines.iter().any(|line| line.contains(">> ") && line.contains("pong")),
        "missing from-server trace in {lines:?}"
    );
}

#[rstest]
fn the_server_runs_in_the_configured_working_dir() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let script =
        r#"while read -r line; do printf '{"id": 1, "version": "0.1", "result": "%s"}\n' "$PWD"; done"#;
    let config =
        crate::tests::support::fake_server("proj", script).with_working_dir(dir.path());
    let (mut session, _sink) = session_for(config);
    session.start().expect("fake server failed to start");

    let command = RawCommand::new("pwd", json!({}));
    let result = command.result_cell();
    assert!(session.send_command_sync(&CommandHandle::new(command)));

    let reported = result
        .take()
        .and_then(|value| value.as_str().map(std::path::PathBuf::from))
        .expect("server reported no working dir");
    assert_eq!(
        reported.canonicalize().expect("reported dir vanished"),
        dir.path().canonicalize().expect("temp dir vanished")
    );

    session.stop();
}

#[rstest]
fn stop_survives_a_server_that_already_died() {
    let (mut session, _sink) = session_for(crate::tests::support::fake_server("proj", "exit 0"));
    let events = session.subscribe();
    session.start().expect("fake server failed to start");

    // The reader notices the closed stream and reports the death.
    wait_until(|| {
        events.try_iter().any(|event| {
            matches!(event, SessionEvent::Stopped { ref label } if label == "proj")
        })
    });

    session.stop();
    session.stop();
}

#[rstest]
fn stop_flushes_a_non_empty_drain_queue() {
    let config = echo_server("proj", PONG_RESPONSE).with_trace(true);
    let (mut session, sink) = session_for(config);
    session.start().expect("fake server failed to start");

    for i in 0..20 {
        session
            .channel()
            .send_command(&CommandHandle::new(RawCommand::new(
                format!("noop-{i}"),
                json!({}),
            )));
    }

    session.stop();

    // Every trace line accepted before shutdown made it to the sink.
    let outbound = sink
        .lines()
        .iter()
        .filter(|line| line.contains("<< "))
        .count();
    assert_eq!(outbound, 20);
}

#[rstest]
fn dropping_a_running_session_stops_it() {
    let (mut session, _sink) = session_for(echo_server("proj", PONG_RESPONSE));
    let events = session.subscribe();
    session.start().expect("fake server failed to start");

    drop(session);

    let received: Vec<SessionEvent> = events.try_iter().collect();
    assert!(received.contains(&SessionEvent::Stopped {
        label: "proj".to_owned()
    }));
}
