//! Notifier trait for delivering accepted events.

use async_trait::async_trait;

use crate::error::MaintmeResult;
use crate::types::{Event, SubscriberId};

/// A notification sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event to the subscriber.
    async fn send(&self, subscriber_id: SubscriberId, event: &Event) -> MaintmeResult<()>;
}
