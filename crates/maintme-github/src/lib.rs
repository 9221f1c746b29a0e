//! GitHub event source for maintme.
//!
//! Reads a user's received-events feed
//! (`GET /users/{login}/received_events`), the activity of every repository
//! and account the user watches or follows.

mod client;
mod models;

pub use client::GitHubEventSource;
pub use models::{WireEvent, WireIssue, WirePayload};
