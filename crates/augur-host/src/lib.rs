//! Session host for the augur analysis server.
//!
//! One [`Session`] binds one child server process to one [`CommandChannel`]
//! and one background log drain. Callers hand the channel a command and
//! either return immediately (asynchronous dispatch) or block until the
//! server answers (synchronous call); a single reader thread correlates
//! responses back to their commands by sequence number. The channel never
//! interprets command payloads; concrete commands supply and consume their
//! own JSON.
//!
//! Thread roles per session: any number of caller threads, exactly one
//! reader thread and exactly one log drain worker.

mod channel;
mod command;
mod commands;
mod config;
mod drain;
mod errors;
mod event;
mod registry;
mod session;
mod supervisor;

#[cfg(test)]
mod tests;

pub use augur_wire::{PROTOCOL_VERSION, Request, Response, ResponseError};
pub use channel::{CommandChannel, FROM_SERVER_PREFIX, TO_SERVER_PREFIX};
pub use command::{Command, CommandHandle, CommandState};
pub use commands::{ConnectionInfo, ConnectionInfoCommand, RawCommand, ResultCell};
pub use config::ServerConfig;
pub use drain::{DrainHandle, LogDrain};
pub use errors::StartupError;
pub use event::SessionEvent;
pub use session::{DefaultLifecycle, Lifecycle, Session};
