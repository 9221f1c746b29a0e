//! Notification sinks.
//!
//! - [`WriterNotifier`] writes one line per event to any `io::Write`
//! - [`WebhookNotifier`] posts signed JSON to an HTTP endpoint, retrying
//!   transient failures

mod webhook;
mod writer;

pub use webhook::{verify_signature, RetryPolicy, WebhookConfig, WebhookNotifier};
pub use writer::WriterNotifier;
