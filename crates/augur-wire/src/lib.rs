//! Wire protocol for the augur analysis server.
//!
//! The server speaks a newline-delimited JSON protocol over its standard
//! streams: one message per line, UTF-8. Requests carry a channel-assigned
//! `id`; responses echo the `id` together with a protocol `version` and
//! either a `result` or a structured `error`. This crate owns the message
//! types and the line framing; correlation and dispatch live in
//! `augur-host`.

mod message;
mod transport;

pub use message::{PROTOCOL_VERSION, Request, Response, ResponseError};
pub use transport::{LineReader, LineWriter, TransportError};
