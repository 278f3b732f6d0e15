//! Handles given to application handlers.
//!
//! Method handlers receive a [`MethodContext`] describing the call;
//! publication handlers receive a [`SubscriptionContext`] through which they
//! push document events.

mod method;
mod subscription;

pub use method::MethodContext;
pub(crate) use subscription::{PublicationEvent, SubscriptionCommand};
pub use subscription::{SubscriptionContext, SubscriptionError};
