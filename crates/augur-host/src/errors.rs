//! Error types for session startup.
//!
//! Startup is the only operation that reports failure as an error value.
//! Everything after a successful start is contained: protocol faults are
//! drained and logged, `stop` is infallible, and only a synchronous
//! command's boolean outcome reaches callers.

use std::io;

use thiserror::Error;

/// Errors raised while launching the analysis server process.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The server executable was not found.
    #[error("analysis server binary not found: {command}")]
    BinaryNotFound {
        /// The command that was not found.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The process could be located but not spawned or wired up.
    #[error("failed to spawn analysis server: {message}")]
    SpawnFailed {
        /// Description of the spawn failure.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}
