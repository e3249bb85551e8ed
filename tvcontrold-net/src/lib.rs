//! Event server for tvcontrold.
//!
//! Multiplexes the UDP command channel, the single-client TCP request
//! channel and the internal event queue into one dispatch loop feeding the
//! command engine.

mod connection;
mod datagram;
pub mod error;
pub mod request;
pub mod response;
pub mod server;

use std::time::Duration;

pub use error::ServerError;
pub use request::{ParseOutcome, Request, RequestBuffer};
pub use response::{PendingResponse, Status};
pub use server::{EventServer, ServerOptions};

/// How often socket threads wake up to check for shutdown.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);
