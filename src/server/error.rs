//! Errors raised by [`DdpServer`](super::DdpServer) operations.

use std::io;

use thiserror::Error;

/// Errors that may occur while binding or running the server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Binding or configuring the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// The session registry task panicked or was aborted.
    #[error("session registry task failed: {0}")]
    Registry(#[from] tokio::task::JoinError),
}
