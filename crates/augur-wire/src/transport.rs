//! Newline-delimited framing over the server's standard streams.
//!
//! Unlike a request/reply transport that owns both directions, the two
//! halves here are independent: caller threads write requests through a
//! [`LineWriter`] while a dedicated reader thread drains the server's
//! output through a [`LineReader`]. Correlation happens above this layer.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};

use thiserror::Error;

use crate::message::Request;

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line was not valid JSON of the expected shape.
    #[error("JSON codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// The write half: serialises requests one per line.
pub struct LineWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> LineWriter<W> {
    /// Wraps a sink (normally the child's stdin).
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            writer: BufWriter::new(sink),
        }
    }

    /// Writes one request followed by a line terminator and flushes.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Codec` if the request cannot be serialised
    /// and `TransportError::Io` if the write or flush fails.
    pub fn send(&mut self, request: &Request) -> Result<String, TransportError> {
        let line = serde_json::to_string(request)?;
        self.send_line(&line)?;
        Ok(line)
    }

    /// Writes an already-serialised line and flushes.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the write or flush fails.
    pub fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// The read half: yields the server's output one line at a time.
pub struct LineReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> LineReader<R> {
    /// Wraps a source (normally the child's stdout).
    #[must_use]
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Reads the next line, without its terminator.
    ///
    /// Returns `Ok(None)` once the stream reaches end-of-file, which for a
    /// child process means the server has exited or closed its output.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the underlying read fails.
    pub fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}
