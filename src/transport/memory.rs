//! In-memory transport connecting a session to a peer in the same process.
//!
//! [`pair`] returns the server side as a [`MemoryTransport`] and the client
//! side as a [`MemoryPeer`]. Tests drive sessions through it without opening
//! sockets; embedders can use it to bridge sessions onto other channels.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Transport, TransportError, TransportReader, TransportWriter};

/// Create a connected transport pair whose directions each buffer up to
/// `capacity` frames.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn pair(capacity: usize) -> (MemoryTransport, MemoryPeer) {
    let (to_server, from_peer) = mpsc::channel(capacity);
    let (to_peer, from_server) = mpsc::channel(capacity);
    (
        MemoryTransport {
            reader: MemoryReader { rx: from_peer },
            writer: MemoryWriter { tx: Some(to_peer) },
        },
        MemoryPeer {
            tx: Some(to_server),
            rx: from_server,
        },
    )
}

/// Server side of an in-memory connection.
pub struct MemoryTransport {
    reader: MemoryReader,
    writer: MemoryWriter,
}

impl Transport for MemoryTransport {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (Self::Reader, Self::Writer) { (self.reader, self.writer) }
}

/// Reading half of a [`MemoryTransport`].
pub struct MemoryReader {
    rx: mpsc::Receiver<String>,
}

#[async_trait]
impl TransportReader for MemoryReader {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Writing half of a [`MemoryTransport`].
pub struct MemoryWriter {
    tx: Option<mpsc::Sender<String>>,
}

#[async_trait]
impl TransportWriter for MemoryWriter {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    tx: Option<mpsc::Sender<String>>,
    rx: mpsc::Receiver<String>,
}

impl MemoryPeer {
    /// Send a raw frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if either side has closed.
    pub async fn send(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame.into())
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Receive the next frame written by the server.
    ///
    /// Returns `None` once the server has closed the connection and every
    /// buffered frame has been read.
    pub async fn recv(&mut self) -> Option<String> { self.rx.recv().await }

    /// Close the client-to-server direction, which the server observes as a
    /// clean disconnect.
    pub fn close(&mut self) { self.tx = None; }
}
