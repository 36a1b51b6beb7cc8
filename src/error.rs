//! Local error types. Nothing here ever crosses the network:
//! protocol-level trouble (stale rounds, loss, malformed datagrams) is
//! handled by dropping or retrying, never by raising an error.
//! `PaxosError` is reserved for
//! the fatal, startup-time failures: bad config, bad CLI flags, a
//! socket that refuses to bind.

use std::net::SocketAddrV4;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaxosError {
    #[error("could not read configuration file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: config::ConfigError,
    },

    #[error("configuration is missing or malformed: {0}")]
    ConfigShape(#[from] config::ConfigError),

    #[error("could not bind multicast socket on {addr}: {source}")]
    SocketBind {
        addr: SocketAddrV4,
        #[source]
        source: std::io::Error,
    },

    #[error("could not join multicast group {addr}: {source}")]
    MulticastJoin {
        addr: SocketAddrV4,
        #[source]
        source: std::io::Error,
    },

    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PaxosError>;
