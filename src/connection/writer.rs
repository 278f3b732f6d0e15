//! Outbound task: the only code that writes to the transport.

use std::{sync::Arc, time::Duration};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::SessionError;
use crate::{
    app::AppState,
    codec::WireCodec,
    message::Message,
    metrics::{self, Direction},
    push::PushQueue,
    session::ConnectionId,
    transport::TransportWriter,
};

/// Write queued frames until the queue ends or `shutdown` fires.
///
/// A `ping` goes out every ping period when no frame is waiting. On shutdown
/// whatever is already queued is flushed before the transport is closed. A
/// failed write cancels `shutdown` so the inbound task stops as well.
pub(super) async fn run<W: TransportWriter>(
    mut writer: W,
    mut queue: PushQueue<Message>,
    app: Arc<AppState>,
    shutdown: CancellationToken,
    id: ConnectionId,
) -> Result<(), SessionError> {
    let cfg = *app.session_config();
    let codec = app.codec();
    let mut ping = time::interval_at(Instant::now() + cfg.ping_period, cfg.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let result = loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                break drain(&mut writer, &mut queue, codec, cfg.write_wait).await;
            }
            frame = queue.recv() => match frame {
                Some(message) => {
                    if let Err(e) = send(&mut writer, codec, &message, cfg.write_wait).await {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
            _ = ping.tick() => {
                if let Err(e) = send(&mut writer, codec, &Message::ping(None), cfg.write_wait).await {
                    break Err(e);
                }
            }
        }
    };

    if result.is_err() {
        shutdown.cancel();
    }
    match time::timeout(cfg.write_wait, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::debug!("transport close failed: id={id}, error={e}"),
        Err(_) => log::debug!("transport close timed out: id={id}"),
    }
    result
}

async fn drain<W: TransportWriter>(
    writer: &mut W,
    queue: &mut PushQueue<Message>,
    codec: &dyn WireCodec,
    wait: Duration,
) -> Result<(), SessionError> {
    queue.close();
    while let Some(message) = queue.try_recv() {
        send(writer, codec, &message, wait).await?;
    }
    Ok(())
}

async fn send<W: TransportWriter>(
    writer: &mut W,
    codec: &dyn WireCodec,
    message: &Message,
    wait: Duration,
) -> Result<(), SessionError> {
    let frame = codec.encode(message)?;
    time::timeout(wait, writer.send(frame))
        .await
        .map_err(|_| SessionError::WriteTimeout(wait))??;
    metrics::inc_frames(Direction::Outbound);
    Ok(())
}
