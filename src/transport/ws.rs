//! Websocket transport backed by `tokio-tungstenite`.
//!
//! Every websocket data frame carries one protocol message. Text frames are
//! passed through; binary frames are accepted if they hold UTF-8 text.
//! Websocket-level ping and pong control frames are answered by tungstenite
//! itself and never reach the connection actor.

use async_trait::async_trait;
use futures::{
    SinkExt,
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{
        Error as WsError,
        Message as WsMessage,
        error::CapacityError,
        protocol::WebSocketConfig,
    },
};

use super::{Transport, TransportError, TransportReader, TransportWriter};

/// A websocket connection that has completed the HTTP upgrade.
pub struct WsTransport<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already upgraded websocket stream.
    #[must_use]
    pub fn new(stream: WebSocketStream<S>) -> Self { Self { stream } }

    /// Perform the server side of the websocket upgrade on a raw stream.
    ///
    /// Frames and messages longer than `max_message_size` bytes are refused
    /// as soon as their header is read.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WebSocket`] if the upgrade handshake fails.
    pub async fn accept(stream: S, max_message_size: usize) -> Result<Self, TransportError> {
        let config = WebSocketConfig::default()
            .max_message_size(Some(max_message_size))
            .max_frame_size(Some(max_message_size));
        let stream = tokio_tungstenite::accept_async_with_config(stream, Some(config)).await?;
        Ok(Self::new(stream))
    }
}

impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WsReader<S>;
    type Writer = WsWriter<S>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.stream.split();
        (WsReader(stream), WsWriter(sink))
    }
}

/// Reading half of a [`WsTransport`].
pub struct WsReader<S>(SplitStream<WebSocketStream<S>>);

/// Writing half of a [`WsTransport`].
pub struct WsWriter<S>(SplitSink<WebSocketStream<S>, WsMessage>);

fn is_closed(error: &WsError) -> bool {
    matches!(error, WsError::ConnectionClosed | WsError::AlreadyClosed)
}

fn read_error(error: WsError) -> TransportError {
    match error {
        WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            TransportError::MessageTooLarge {
                size,
                max: max_size,
            }
        }
        other => other.into(),
    }
}

#[async_trait]
impl<S> TransportReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let frame = match self.0.next().await? {
                Ok(frame) => frame,
                Err(e) if is_closed(&e) => return None,
                Err(e) => return Some(Err(read_error(e))),
            };
            match frame {
                WsMessage::Text(text) => return Some(Ok(text.as_str().to_owned())),
                WsMessage::Binary(bytes) => {
                    return Some(
                        String::from_utf8(bytes.to_vec()).map_err(|_| TransportError::InvalidUtf8),
                    );
                }
                WsMessage::Close(_) => return None,
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }
}

#[async_trait]
impl<S> TransportWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.0.send(WsMessage::Text(frame.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.0.close().await {
            Ok(()) => Ok(()),
            Err(e) if is_closed(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
