//! Per-message handling for the inbound task.

use log::{debug, info, warn};
use tokio::time::Instant;

use super::{Inbound, SessionError};
use crate::{
    config::PROTOCOL_VERSION,
    context::{MethodContext, PublicationEvent, SubscriptionCommand, SubscriptionContext},
    error::DdpError,
    message::{Message, MessageKind},
    metrics::{self, Direction},
};

fn require(value: Option<String>, kind: MessageKind, field: &'static str) -> Result<String, SessionError> {
    value.ok_or(SessionError::Malformed {
        kind: kind.as_str(),
        field,
    })
}

impl Inbound {
    /// Decode and act on one inbound frame.
    pub(super) async fn handle_frame(&mut self, frame: &str) -> Result<(), SessionError> {
        metrics::inc_frames(Direction::Inbound);
        let max = self.app.session_config().max_message_size;
        if frame.len() > max {
            return Err(SessionError::MessageTooLarge {
                size: frame.len(),
                max,
            });
        }

        let message = self.app.codec().decode(frame)?;
        let Some(kind) = message.kind()? else {
            return Err(SessionError::Malformed {
                kind: "untagged",
                field: "msg",
            });
        };

        match kind {
            MessageKind::Connect => self.handle_connect(message).await,
            MessageKind::Ping => self.send(Message::pong(message.id)).await,
            MessageKind::Pong => {
                self.deadline = Instant::now() + self.app.session_config().pong_wait;
                Ok(())
            }
            MessageKind::Method | MessageKind::Sub | MessageKind::Unsub
                if !self.state.is_connected() =>
            {
                warn!("{kind} before handshake ignored: id={}", self.id);
                Ok(())
            }
            MessageKind::Method => self.handle_method(message).await,
            MessageKind::Sub => self.handle_sub(message).await,
            MessageKind::Unsub => self.handle_unsub(message).await,
            other => Err(SessionError::UnexpectedMessage(other)),
        }
    }

    async fn handle_connect(&mut self, message: Message) -> Result<(), SessionError> {
        if self.state.is_connected() {
            warn!("repeated connect ignored: id={}", self.id);
            return Ok(());
        }
        if message.version.as_deref() != Some(PROTOCOL_VERSION) {
            self.send(Message::failed(PROTOCOL_VERSION)).await?;
            return Err(SessionError::UnsupportedVersion(message.version));
        }

        let session = self.app.new_session_id();
        info!("handshake complete: id={}, session={session}", self.id);
        self.state.connect(session.clone());
        self.send(Message::connected(session)).await
    }

    async fn handle_method(&mut self, message: Message) -> Result<(), SessionError> {
        let id = require(message.id, MessageKind::Method, "id")?;
        let name = require(message.method, MessageKind::Method, "method")?;
        let session = self.state.session_id().unwrap_or_default().to_owned();
        let ctx = MethodContext::new(
            id.clone(),
            name.clone(),
            message.params.unwrap_or_default(),
            self.id,
            session,
        );

        let Some(handler) = self.app.method(&name).cloned() else {
            debug!("unknown method: id={}, method={name}", self.id);
            if ctx.mark_done() {
                self.send(Message::method_error(id, DdpError::unknown_method(&name)))
                    .await?;
            }
            return Ok(());
        };

        match handler(ctx.clone()).await {
            Ok(result) => {
                if ctx.mark_done() {
                    self.send(Message::result(id.clone(), result)).await?;
                }
                self.flush_commands().await?;
                if ctx.mark_updated() {
                    self.send(Message::updated(vec![id])).await?;
                }
            }
            Err(error) => {
                debug!(
                    "method failed: id={}, method={name}, error={error}",
                    self.id
                );
                if ctx.mark_done() {
                    self.send(Message::method_error(id, error)).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_sub(&mut self, message: Message) -> Result<(), SessionError> {
        let id = require(message.id, MessageKind::Sub, "id")?;
        let name = require(message.name, MessageKind::Sub, "name")?;
        if self.state.has_subscription(&id) {
            warn!("duplicate subscription id ignored: id={}, sub={id}", self.id);
            return Ok(());
        }
        let Some(handler) = self.app.publication(&name).cloned() else {
            debug!("unknown publication: id={}, name={name}", self.id);
            return self
                .send(Message::nosub(id, Some(DdpError::unknown_subscription(&name))))
                .await;
        };

        let session = self.state.session_id().unwrap_or_default().to_owned();
        let key = self.state.allocate_key();
        let ctx = SubscriptionContext::new(
            id.clone(),
            key,
            name.clone(),
            message.params.unwrap_or_default(),
            self.id,
            session,
            self.commands_tx.clone(),
        );
        self.state.insert_subscription(id.clone(), ctx.clone());
        metrics::inc_subscriptions();

        if let Err(error) = handler(ctx).await {
            debug!(
                "publication failed: id={}, name={name}, error={error}",
                self.id
            );
            self.stop_subscription(&id).await?;
            self.send(Message::nosub(id, Some(error))).await?;
        }
        Ok(())
    }

    async fn handle_unsub(&mut self, message: Message) -> Result<(), SessionError> {
        let id = require(message.id, MessageKind::Unsub, "id")?;
        if self.stop_subscription(&id).await? {
            self.send(Message::nosub(id, None)).await
        } else {
            let error = DdpError::unknown_subscription_id(&id);
            self.send(Message::nosub(id, Some(error))).await
        }
    }

    /// Remove a subscription and withdraw everything it published.
    ///
    /// Returns `false` if `id` is not a live subscription.
    async fn stop_subscription(&mut self, id: &str) -> Result<bool, SessionError> {
        let Some(sub) = self.state.remove_subscription(id) else {
            return Ok(false);
        };
        sub.context.stop();
        metrics::dec_subscriptions();
        for delta in self.state.merge.retract(sub.key) {
            self.send(delta.into()).await?;
        }
        Ok(true)
    }

    /// Apply one publication event through the merge box.
    pub(super) async fn apply(&mut self, command: SubscriptionCommand) -> Result<(), SessionError> {
        let SubscriptionCommand { sub_id, key, event } = command;
        if !self.state.owns(&sub_id, key) {
            debug!(
                "push from stopped subscription ignored: id={}, sub={sub_id}",
                self.id
            );
            return Ok(());
        }

        let message = match event {
            PublicationEvent::Ready => Some(Message::ready(vec![sub_id])),
            PublicationEvent::Added {
                collection,
                id,
                fields,
            } => self
                .state
                .merge
                .added(key, &collection, &id, fields)
                .map(Message::from),
            PublicationEvent::Changed {
                collection,
                id,
                fields,
                cleared,
            } => self
                .state
                .merge
                .changed(key, &collection, &id, fields, &cleared)
                .map(Message::from),
            PublicationEvent::Removed { collection, id } => self
                .state
                .merge
                .removed(key, &collection, &id)
                .map(Message::from),
        };
        match message {
            Some(message) => self.send(message).await,
            None => Ok(()),
        }
    }

    /// Apply every publication event already waiting.
    async fn flush_commands(&mut self) -> Result<(), SessionError> {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command).await?;
        }
        Ok(())
    }
}
