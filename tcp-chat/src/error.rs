//! Error types shared by the server components.

use std::{io, net::SocketAddr};

/// Why a registration attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("username '{0}' is already in use")]
    UsernameTaken(String),

    #[error("connection is already registered as '{0}'")]
    AlreadyRegistered(String),
}

/// A transport error on one connection, reported to the server's run loop.
#[derive(Debug, thiserror::Error)]
#[error("connection {peer} failed: {source}")]
pub struct ConnectionFailure {
    pub peer: SocketAddr,
    #[source]
    pub source: io::Error,
}

impl ConnectionFailure {
    pub fn new(peer: SocketAddr, source: io::Error) -> Self {
        Self { peer, source }
    }
}

/// What the server does when a single connection hits a transport error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop serving and surface the error to the operator.
    #[default]
    Fatal,
    /// Log the failure and keep serving everyone else.
    Isolate,
}
