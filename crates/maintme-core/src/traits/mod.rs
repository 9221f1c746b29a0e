//! Capability traits consumed by the poller.

mod event_source;
mod notifier;
mod store;

pub use event_source::*;
pub use notifier::*;
pub use store::*;
