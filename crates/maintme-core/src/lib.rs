//! maintme-core - Core library for maintme.
//!
//! This crate polls a per-subscriber activity feed, runs every event through
//! the subscriber's filter rules, suppresses repeated deliveries and forwards
//! what survives to a notifier. Storage, the feed and delivery are consumed
//! through the traits in [`traits`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use maintme_core::{MaintmeConfig, Poller, WriterNotifier};
//!
//! let config = MaintmeConfig::from_env()?;
//! let poller = Poller::new(
//!     store,
//!     source,
//!     Arc::new(WriterNotifier::stdout()),
//!     config.poller,
//!     &config.dedup,
//! );
//!
//! let handle = poller.spawn();
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod notify;
pub mod poller;
pub mod rules;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GitHubConfig, MaintmeConfig, NotifierConfig, StoreConfig};
pub use dedup::{DedupCache, DedupConfig};
pub use error::{ErrorCode, MaintmeError, MaintmeResult};
pub use notify::{verify_signature, WebhookConfig, WebhookNotifier, WriterNotifier};
pub use poller::{CycleOutcome, CycleReport, Poller, PollerConfig, PollerHandle, TickReport};
pub use rules::{Decision, DecisionReason, RuleSet, Verdict};
pub use traits::{EventPage, EventSource, Notifier, PageToken, Store};
pub use types::{
    Condition, ConditionId, Credentials, Event, Filter, FilterId, IssuePayload, Subscriber,
    SubscriberId,
};
