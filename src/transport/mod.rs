//! Message-oriented transports carrying encoded protocol frames.
//!
//! A [`Transport`] splits into a reading half owned by the connection's
//! inbound task and a writing half owned by its outbound task. Each half is
//! used from exactly one task, so neither needs internal locking.

use std::io;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod ws;

pub use ws::WsTransport;

/// Errors surfaced by transport halves.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The underlying socket failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    /// The websocket layer reported a protocol or connection failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// The peer started a frame larger than the read limit. The payload is
    /// never buffered.
    #[error("frame of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },
    /// A frame did not contain valid UTF-8 text.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    /// The peer has gone away; no more frames can be exchanged.
    #[error("transport closed")]
    Closed,
}

/// Reading half of a transport.
#[async_trait]
pub trait TransportReader: Send + 'static {
    /// Receive the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection cleanly.
    /// Implementations must be cancellation safe: dropping a pending call
    /// must not lose a frame.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
}

/// Writing half of a transport.
#[async_trait]
pub trait TransportWriter: Send + 'static {
    /// Send a single text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the frame could not be written.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Close the connection, signalling the peer that no more frames follow.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the close handshake could not be sent.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A bidirectional frame channel that can be split into independent halves.
pub trait Transport: Send + 'static {
    /// Reading half.
    type Reader: TransportReader;
    /// Writing half.
    type Writer: TransportWriter;

    /// Split the transport into its reading and writing halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}
