//! Outbound queue feeding a connection's writer task.
//!
//! Every frame a connection sends, whether a method reply or a publication
//! delta, passes through one bounded [`PushQueue`]. Producers hold a
//! cloneable [`PushHandle`]; the writer task is the only consumer, so frames
//! leave in the order they were queued.

mod builder;
mod errors;
mod handle;

pub use builder::PushQueueBuilder;
pub use errors::{PushConfigError, PushError};
pub use handle::PushHandle;
use tokio::sync::mpsc;

/// Frames that can travel through a [`PushQueue`].
///
/// Any type that is `Send` and `'static` qualifies.
pub trait FrameLike: Send + 'static {}

impl<T> FrameLike for T where T: Send + 'static {}

/// Default queue capacity in frames.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
/// Highest allowed queue capacity for [`PushQueueBuilder`].
pub const MAX_QUEUE_CAPACITY: usize = 10_000;

/// Behaviour when the queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PushPolicy {
    /// Wait until the writer frees a slot.
    #[default]
    BlockIfFull,
    /// Return [`PushError::QueueFull`] to the caller.
    ReturnErrorIfFull,
    /// Silently drop the frame.
    DropIfFull,
    /// Drop the frame but emit a log warning.
    WarnAndDropIfFull,
}

/// Receiving end of the outbound queue, owned by the writer task.
pub struct PushQueue<F> {
    rx: mpsc::Receiver<F>,
}

impl<F: FrameLike> PushQueue<F> {
    /// Start building a queue.
    #[must_use]
    pub fn builder() -> PushQueueBuilder<F> { PushQueueBuilder::default() }

    /// Wait for the next frame.
    ///
    /// Returns `None` once every [`PushHandle`] has been dropped and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<F> { self.rx.recv().await }

    /// Take a frame if one is ready.
    pub fn try_recv(&mut self) -> Option<F> { self.rx.try_recv().ok() }

    /// Number of frames waiting to be written.
    #[must_use]
    pub fn len(&self) -> usize { self.rx.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.rx.is_empty() }

    /// Stop accepting new frames. Frames already queued can still be read.
    pub fn close(&mut self) { self.rx.close(); }
}
