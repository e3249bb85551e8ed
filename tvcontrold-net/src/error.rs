use std::io;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("{0} stopped unexpectedly")]
    SourceClosed(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}
