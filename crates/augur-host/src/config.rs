//! Configuration for spawning an analysis server.

use std::path::PathBuf;

/// How to launch one server and label its session.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The executable path or command name.
    pub executable: PathBuf,
    /// Arguments to pass to the server.
    pub args: Vec<String>,
    /// Working directory for the spawned process; inherits ours when unset.
    pub working_dir: Option<PathBuf>,
    /// Session label used in trace output, usually the project name.
    pub label: String,
    /// Mirror every wire message to the log drain.
    pub trace: bool,
}

impl ServerConfig {
    /// Creates a configuration for the given executable and session label.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            label: label.into(),
            trace: false,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Enables or disables wire tracing.
    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}
