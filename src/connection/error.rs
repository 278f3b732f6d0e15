//! Reasons a connection actor stops.

use std::time::Duration;

use thiserror::Error;

use crate::{
    codec::CodecError,
    message::{MessageKind, UnknownKind},
    push::{PushConfigError, PushError},
    transport::TransportError,
};

/// Why a connection ended abnormally.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Reading from or writing to the transport failed.
    #[error(transparent)]
    Transport(TransportError),
    /// A frame could not be decoded, or a reply could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The client sent a `msg` this server does not know.
    #[error("unknown message kind `{0}`")]
    UnknownMessage(String),
    /// The client sent a kind only a server may send.
    #[error("unexpected `{0}` message from client")]
    UnexpectedMessage(MessageKind),
    /// A required field was absent.
    #[error("malformed `{kind}` message: missing `{field}`")]
    Malformed {
        kind: &'static str,
        field: &'static str,
    },
    /// The client asked for a protocol version this server does not speak.
    #[error("unsupported protocol version {0:?}")]
    UnsupportedVersion(Option<String>),
    /// An inbound frame exceeded the configured size limit.
    #[error("frame of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },
    /// The client did not answer a ping in time.
    #[error("no pong received within {0:?}")]
    ReadTimeout(Duration),
    /// A frame could not be written in time.
    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),
    /// The outbound queue rejected a frame.
    #[error(transparent)]
    Push(#[from] PushError),
    /// The outbound queue could not be built.
    #[error(transparent)]
    PushConfig(#[from] PushConfigError),
}

impl From<TransportError> for SessionError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::MessageTooLarge { size, max } => Self::MessageTooLarge { size, max },
            other => Self::Transport(other),
        }
    }
}

impl From<UnknownKind> for SessionError {
    fn from(kind: UnknownKind) -> Self { Self::UnknownMessage(kind.0) }
}

impl SessionError {
    /// Short label used for the errors metric.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Codec(_) => "codec",
            Self::UnknownMessage(_) | Self::UnexpectedMessage(_) | Self::Malformed { .. } => {
                "protocol"
            }
            Self::UnsupportedVersion(_) => "handshake",
            Self::MessageTooLarge { .. } => "too_large",
            Self::ReadTimeout(_) | Self::WriteTimeout(_) => "timeout",
            Self::Push(_) | Self::PushConfig(_) => "push",
        }
    }
}
