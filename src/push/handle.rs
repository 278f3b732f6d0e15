//! Cloneable handle used by producers to queue outbound frames.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{FrameLike, PushError, PushPolicy};

struct PushHandleInner<F> {
    tx: mpsc::Sender<F>,
    policy: PushPolicy,
    dropped: AtomicUsize,
}

/// Cloneable handle used by producers to push frames to a connection.
///
/// The writer task keeps running while any handle is alive.
pub struct PushHandle<F>(Arc<PushHandleInner<F>>);

impl<F> Clone for PushHandle<F> {
    fn clone(&self) -> Self { Self(Arc::clone(&self.0)) }
}

impl<F: FrameLike> PushHandle<F> {
    pub(super) fn new(tx: mpsc::Sender<F>, policy: PushPolicy) -> Self {
        Self(Arc::new(PushHandleInner {
            tx,
            policy,
            dropped: AtomicUsize::new(0),
        }))
    }

    /// Policy applied by [`push`](Self::push) when the queue is full.
    #[must_use]
    pub fn policy(&self) -> PushPolicy { self.0.policy }

    /// Number of frames discarded because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> usize { self.0.dropped.load(Ordering::Relaxed) }

    /// Returns `true` once the writer has stopped reading.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.0.tx.is_closed() }

    /// Queue a frame using the handle's configured policy.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the writer has gone away, or
    /// [`PushError::QueueFull`] under [`PushPolicy::ReturnErrorIfFull`].
    pub async fn push(&self, frame: F) -> Result<(), PushError> {
        match self.0.policy {
            PushPolicy::BlockIfFull => self.push_blocking(frame).await,
            policy => self.try_push(frame, policy),
        }
    }

    /// Queue a frame, waiting for capacity if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the writer has gone away.
    pub async fn push_blocking(&self, frame: F) -> Result<(), PushError> {
        let permit = self
            .0
            .tx
            .clone()
            .reserve_owned()
            .await
            .map_err(|_| PushError::Closed)?;
        let returned_tx = permit.send(frame);
        // The writer may close between reserving and sending.
        if returned_tx.is_closed() {
            return Err(PushError::Closed);
        }
        debug!("frame queued");
        Ok(())
    }

    /// Queue a frame without waiting, applying `policy` if the queue is full.
    ///
    /// [`PushPolicy::BlockIfFull`] cannot wait here and behaves like
    /// [`PushPolicy::ReturnErrorIfFull`].
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the writer has gone away, or
    /// [`PushError::QueueFull`] when the frame could not be queued and the
    /// policy does not drop it.
    pub fn try_push(&self, frame: F, policy: PushPolicy) -> Result<(), PushError> {
        match self.0.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => match policy {
                PushPolicy::BlockIfFull | PushPolicy::ReturnErrorIfFull => {
                    Err(PushError::QueueFull)
                }
                PushPolicy::DropIfFull | PushPolicy::WarnAndDropIfFull => {
                    let dropped = self.0.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if policy == PushPolicy::WarnAndDropIfFull {
                        warn!(?policy, dropped, "push queue full; frame dropped");
                    }
                    Ok(())
                }
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PushError::Closed),
        }
    }
}
