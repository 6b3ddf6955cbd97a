//! Shared fixtures for host tests.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::config::ServerConfig;

/// An in-memory sink whose contents every clone can inspect.
#[derive(Clone, Default)]
pub(crate) struct SharedSink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedSink {
    /// The complete lines written so far.
    pub(crate) fn lines(&self) -> Vec<String> {
        let buffer = self
            .buffer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        String::from_utf8_lossy(&buffer)
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A config running `/bin/sh` with the given script as a fake server.
pub(crate) fn fake_server(label: &str, script: &str) -> ServerConfig {
    ServerConfig::new("/bin/sh", label)
        .with_arg("-c")
        .with_arg(script)
}

/// A fake server that answers every request with the same response line.
///
/// The first command sent on a fresh session gets id 1, so a canned
/// response with `"id": 1` correlates with it.
pub(crate) fn echo_server(label: &str, response: &str) -> ServerConfig {
    fake_server(
        label,
        &format!("while read -r line; do printf '%s\\n' '{response}'; done"),
    )
}
