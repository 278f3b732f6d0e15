//! Builder for configuring the outbound queue.

use super::{
    DEFAULT_QUEUE_CAPACITY,
    FrameLike,
    MAX_QUEUE_CAPACITY,
    PushConfigError,
    PushHandle,
    PushPolicy,
    PushQueue,
};

/// Builder for [`PushQueue`].
///
/// Defaults to [`DEFAULT_QUEUE_CAPACITY`] frames and
/// [`PushPolicy::BlockIfFull`].
///
/// ```
/// use ddpframe::push::{PushPolicy, PushQueue};
///
/// let (_queue, handle) = PushQueue::<u8>::builder()
///     .capacity(8)
///     .policy(PushPolicy::WarnAndDropIfFull)
///     .build()
///     .expect("capacity within bounds");
/// assert_eq!(handle.policy(), PushPolicy::WarnAndDropIfFull);
/// ```
#[derive(Debug)]
pub struct PushQueueBuilder<F> {
    capacity: usize,
    policy: PushPolicy,
    _frame: std::marker::PhantomData<fn() -> F>,
}

impl<F: FrameLike> Default for PushQueueBuilder<F> {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            policy: PushPolicy::default(),
            _frame: std::marker::PhantomData,
        }
    }
}

impl<F: FrameLike> PushQueueBuilder<F> {
    /// Set the queue capacity in frames.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the policy applied by [`PushHandle::push`] when the queue is full.
    #[must_use]
    pub fn policy(mut self, policy: PushPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the queue and its paired handle.
    ///
    /// # Errors
    ///
    /// Returns [`PushConfigError::InvalidCapacity`] if the capacity is zero or
    /// exceeds [`MAX_QUEUE_CAPACITY`].
    pub fn build(self) -> Result<(PushQueue<F>, PushHandle<F>), PushConfigError> {
        if self.capacity == 0 || self.capacity > MAX_QUEUE_CAPACITY {
            return Err(PushConfigError::InvalidCapacity(self.capacity));
        }
        let (tx, rx) = tokio::sync::mpsc::channel(self.capacity);
        Ok((PushQueue { rx }, PushHandle::new(tx, self.policy)))
    }
}
