//! Wire envelope shared by every protocol message.
//!
//! [`Message`] carries every field any message kind may use. Presence decides
//! meaning: constructors populate exactly the fields relevant to their kind
//! and everything else stays `None`, which the encoder omits entirely.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DdpError;

/// Field set of a published document.
///
/// Keys keep their insertion order so encoded documents mirror what the
/// publication supplied.
pub type Fields = Map<String, Value>;

/// Discriminator carried in the `msg` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Connect,
    Connected,
    Failed,
    Ping,
    Pong,
    Method,
    Result,
    Updated,
    Sub,
    Unsub,
    Nosub,
    Ready,
    Added,
    Changed,
    Removed,
}

impl MessageKind {
    /// Return the wire spelling of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Method => "method",
            Self::Result => "result",
            Self::Updated => "updated",
            Self::Sub => "sub",
            Self::Unsub => "unsub",
            Self::Nosub => "nosub",
            Self::Ready => "ready",
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error returned when a `msg` discriminator is not recognised.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown message kind `{0}`")]
pub struct UnknownKind(pub String);

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "connect" => Self::Connect,
            "connected" => Self::Connected,
            "failed" => Self::Failed,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "method" => Self::Method,
            "result" => Self::Result,
            "updated" => Self::Updated,
            "sub" => Self::Sub,
            "unsub" => Self::Unsub,
            "nosub" => Self::Nosub,
            "ready" => Self::Ready,
            "added" => Self::Added,
            "changed" => Self::Changed,
            "removed" => Self::Removed,
            other => return Err(UnknownKind(other.to_owned())),
        };
        Ok(kind)
    }
}

/// Universal protocol envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DdpError>,
}

impl Message {
    fn of_kind(kind: MessageKind) -> Self {
        Self {
            msg: Some(kind.as_str().to_owned()),
            ..Self::default()
        }
    }

    /// Parse the `msg` discriminator.
    ///
    /// Returns `None` when the field is absent, which is the case for the
    /// server greeting frame.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownKind`] when the discriminator is not a known kind.
    pub fn kind(&self) -> Result<Option<MessageKind>, UnknownKind> {
        self.msg.as_deref().map(str::parse).transpose()
    }

    /// Greeting frame sent before anything else on a new connection.
    #[must_use]
    pub fn server_id(server_id: impl Into<String>) -> Self {
        Self {
            server_id: Some(server_id.into()),
            ..Self::default()
        }
    }

    /// Client handshake request.
    #[must_use]
    pub fn connect(version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            support: Some(vec![version.clone()]),
            version: Some(version),
            ..Self::of_kind(MessageKind::Connect)
        }
    }

    #[must_use]
    pub fn connected(session: impl Into<String>) -> Self {
        Self {
            session: Some(session.into()),
            ..Self::of_kind(MessageKind::Connected)
        }
    }

    /// Handshake rejection naming the version the server speaks.
    #[must_use]
    pub fn failed(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::of_kind(MessageKind::Failed)
        }
    }

    #[must_use]
    pub fn ping(id: Option<String>) -> Self {
        Self {
            id,
            ..Self::of_kind(MessageKind::Ping)
        }
    }

    #[must_use]
    pub fn pong(id: Option<String>) -> Self {
        Self {
            id,
            ..Self::of_kind(MessageKind::Pong)
        }
    }

    /// Remote method invocation.
    #[must_use]
    pub fn method(id: impl Into<String>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: Some(id.into()),
            method: Some(method.into()),
            params: Some(params),
            ..Self::of_kind(MessageKind::Method)
        }
    }

    /// Successful method reply.
    #[must_use]
    pub fn result(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: Some(id.into()),
            result: Some(result),
            ..Self::of_kind(MessageKind::Result)
        }
    }

    /// Failed method reply.
    #[must_use]
    pub fn method_error(id: impl Into<String>, error: DdpError) -> Self {
        Self {
            id: Some(id.into()),
            error: Some(error),
            ..Self::of_kind(MessageKind::Result)
        }
    }

    #[must_use]
    pub fn updated(methods: Vec<String>) -> Self {
        Self {
            methods: Some(methods),
            ..Self::of_kind(MessageKind::Updated)
        }
    }

    /// Subscription request.
    #[must_use]
    pub fn sub(id: impl Into<String>, name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            params: Some(params),
            ..Self::of_kind(MessageKind::Sub)
        }
    }

    #[must_use]
    pub fn unsub(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::of_kind(MessageKind::Unsub)
        }
    }

    /// Subscription termination, carrying an error when the subscription
    /// failed rather than being stopped by the client.
    #[must_use]
    pub fn nosub(id: impl Into<String>, error: Option<DdpError>) -> Self {
        Self {
            id: Some(id.into()),
            error,
            ..Self::of_kind(MessageKind::Nosub)
        }
    }

    #[must_use]
    pub fn ready(subs: Vec<String>) -> Self {
        Self {
            subs: Some(subs),
            ..Self::of_kind(MessageKind::Ready)
        }
    }

    #[must_use]
    pub fn added(collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self {
            collection: Some(collection.into()),
            id: Some(id.into()),
            fields: Some(fields),
            ..Self::of_kind(MessageKind::Added)
        }
    }

    /// Document delta. Empty `fields` or `cleared` are omitted from the frame.
    #[must_use]
    pub fn changed(
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Fields,
        cleared: Vec<String>,
    ) -> Self {
        Self {
            collection: Some(collection.into()),
            id: Some(id.into()),
            fields: (!fields.is_empty()).then_some(fields),
            cleared: (!cleared.is_empty()).then_some(cleared),
            ..Self::of_kind(MessageKind::Changed)
        }
    }

    #[must_use]
    pub fn removed(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            id: Some(id.into()),
            ..Self::of_kind(MessageKind::Removed)
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(MessageKind::Connect)]
    #[case(MessageKind::Nosub)]
    #[case(MessageKind::Changed)]
    fn kind_parses_its_own_spelling(#[case] kind: MessageKind) {
        assert_eq!(kind.as_str().parse::<MessageKind>(), Ok(kind));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let msg = Message {
            msg: Some("subscribe".into()),
            ..Message::default()
        };
        assert_eq!(msg.kind(), Err(UnknownKind("subscribe".into())));
    }

    #[test]
    fn greeting_has_no_kind() {
        assert_eq!(Message::server_id("0").kind(), Ok(None));
    }

    #[test]
    fn unused_fields_are_omitted() {
        let encoded = serde_json::to_value(Message::pong(None)).expect("encode pong");
        assert_eq!(encoded, json!({ "msg": "pong" }));
    }

    #[test]
    fn changed_omits_empty_parts() {
        let mut fields = Fields::new();
        fields.insert("title".into(), json!("hello"));
        let encoded = serde_json::to_value(Message::changed("posts", "p1", fields, Vec::new()))
            .expect("encode changed");
        assert_eq!(
            encoded,
            json!({ "msg": "changed", "collection": "posts", "id": "p1", "fields": { "title": "hello" } })
        );
    }
}
