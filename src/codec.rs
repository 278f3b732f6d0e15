//! Wire codecs translating [`Message`] values to and from transport frames.
//!
//! Frames are text: each transport message carries exactly one encoded
//! protocol message. [`JsonCodec`] is the default and matches what browser
//! clients speak; other structured encodings can be plugged in by
//! implementing [`WireCodec`].

use thiserror::Error;

use crate::message::Message;

/// Errors raised while encoding or decoding a frame.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The frame did not contain a well-formed message.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Encoding used between the transport and the connection actor.
pub trait WireCodec: Send + Sync + 'static {
    /// Encode a message into a single text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the message cannot be represented.
    fn encode(&self, message: &Message) -> Result<String, CodecError>;

    /// Decode a single text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the frame is not a valid message.
    fn decode(&self, frame: &str) -> Result<Message, CodecError>;
}

/// JSON object framing backed by `serde_json`.
///
/// ```
/// use ddpframe::{
///     codec::{JsonCodec, WireCodec},
///     message::Message,
/// };
///
/// let codec = JsonCodec;
/// let frame = codec.encode(&Message::ping(Some("7".into()))).unwrap();
/// assert_eq!(frame, r#"{"msg":"ping","id":"7"}"#);
/// assert_eq!(codec.decode(&frame).unwrap(), Message::ping(Some("7".into())));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl WireCodec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<String, CodecError> {
        serde_json::to_string(message).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode(&self, frame: &str) -> Result<Message, CodecError> {
        serde_json::from_str(frame).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
